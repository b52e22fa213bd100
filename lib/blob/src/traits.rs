use crate::error::BlobError;

/// BlobStore holds the two JSON artifacts the pipeline stages hand to each
/// other (`var/users.json`, `var/timecamp_users.json`).
///
/// Keys are path-like strings. Reads and writes are whole-object; there
/// are no partial reads. The default implementation (`FileStore`) maps
/// keys to local filesystem paths; `S3Store` targets any S3-compatible
/// object store.
pub trait BlobStore: Send + Sync {
    /// Retrieve an artifact. Missing keys are `BlobError::NotFound`.
    fn get_json(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    /// Store an artifact, atomically replacing any previous value.
    fn put_json(&self, key: &str, data: &[u8]) -> Result<(), BlobError>;

    /// Check whether an artifact exists.
    fn exists(&self, key: &str) -> Result<bool, BlobError>;
}
