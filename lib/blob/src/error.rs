use thiserror::Error;

use campsync_core::SyncError;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("auth error: {0}")]
    Auth(String),
}

impl From<BlobError> for SyncError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(m) => SyncError::NotFound(m),
            BlobError::Io(m) => SyncError::Transport(m),
            BlobError::Transport(m) => SyncError::Transport(m),
            BlobError::Auth(m) => SyncError::Auth(m),
        }
    }
}
