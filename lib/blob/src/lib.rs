pub mod error;
pub mod file;
pub mod s3;
pub mod traits;

pub use error::BlobError;
pub use file::FileStore;
pub use s3::S3Store;
pub use traits::BlobStore;

use campsync_core::StorageConfig;

/// Open the blob store selected by `USE_S3_STORAGE`.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn BlobStore>, BlobError> {
    if config.use_s3 {
        Ok(Box::new(S3Store::open(config)?))
    } else {
        Ok(Box::new(FileStore::open(std::path::Path::new(
            &config.local_dir,
        ))?))
    }
}
