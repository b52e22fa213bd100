use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::debug;

use campsync_core::StorageConfig;

use crate::error::BlobError;
use crate::traits::BlobStore;

/// S3Store is a BlobStore over any S3-compatible object store.
///
/// A custom `S3_ENDPOINT_URL` together with `S3_FORCE_PATH_STYLE=true`
/// targets MinIO and friends; without an endpoint the region resolves to
/// plain AWS S3. Objects are read and written whole.
pub struct S3Store {
    bucket: Box<Bucket>,
    path_prefix: String,
}

impl S3Store {
    pub fn open(config: &StorageConfig) -> Result<Self, BlobError> {
        let credentials = Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            None,
            None,
            None,
        )
        .map_err(|e| BlobError::Auth(e.to_string()))?;

        let region = match &config.endpoint_url {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| BlobError::Io(format!("invalid S3 region: {}", e)))?,
        };

        let mut bucket = Bucket::new(&config.bucket_name, region, credentials)
            .map_err(|e| BlobError::Transport(e.to_string()))?;
        if config.force_path_style {
            bucket = bucket.with_path_style();
        }

        debug!(bucket = %config.bucket_name, "opened S3 blob store");

        Ok(Self {
            bucket,
            path_prefix: config.path_prefix.trim_matches('/').to_string(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        if self.path_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.path_prefix, key)
        }
    }

    fn classify(key: &str, err: s3::error::S3Error) -> BlobError {
        let msg = err.to_string();
        if msg.contains("404") || msg.contains("NoSuchKey") {
            BlobError::NotFound(key.to_string())
        } else if msg.contains("403") || msg.contains("AccessDenied") || msg.contains("credential")
        {
            BlobError::Auth(msg)
        } else {
            BlobError::Transport(msg)
        }
    }
}

impl BlobStore for S3Store {
    fn get_json(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let object_key = self.object_key(key);
        let response = self
            .bucket
            .get_object(&object_key)
            .map_err(|e| Self::classify(key, e))?;
        match response.status_code() {
            200 => Ok(response.to_vec()),
            404 => Err(BlobError::NotFound(key.to_string())),
            403 => Err(BlobError::Auth(format!("access denied for {}", object_key))),
            code => Err(BlobError::Transport(format!(
                "GET {} returned HTTP {}",
                object_key, code
            ))),
        }
    }

    fn put_json(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let object_key = self.object_key(key);
        let response = self
            .bucket
            .put_object_with_content_type(&object_key, data, "application/json")
            .map_err(|e| Self::classify(key, e))?;
        match response.status_code() {
            200 | 204 => Ok(()),
            403 => Err(BlobError::Auth(format!("access denied for {}", object_key))),
            code => Err(BlobError::Transport(format!(
                "PUT {} returned HTTP {}",
                object_key, code
            ))),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let object_key = self.object_key(key);
        match self.bucket.head_object(&object_key) {
            Ok((_, 200)) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) => Err(BlobError::Transport(format!(
                "HEAD {} returned HTTP {}",
                object_key, code
            ))),
            Err(e) => match Self::classify(key, e) {
                BlobError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }
}
