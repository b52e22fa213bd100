use thiserror::Error;

/// Unified error type shared by every pipeline stage.
///
/// Variants map one-to-one onto the failure surface of the external
/// collaborators: configuration, transport, the TimeCamp REST API, and the
/// blob store. `Config` and `Auth` are fatal at process level; everything
/// else is handled per record by the engines.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("config: {0}")]
    Config(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this error must abort the whole run instead of one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(SyncError::Config("x".into()).is_fatal());
        assert!(SyncError::Auth("x".into()).is_fatal());
        assert!(!SyncError::Transport("x".into()).is_fatal());
        assert!(!SyncError::NotFound("x".into()).is_fatal());
        assert!(!SyncError::Validation("x".into()).is_fatal());
    }

    #[test]
    fn display_carries_kind_prefix() {
        assert_eq!(
            SyncError::RateLimited("slow down".into()).to_string(),
            "rate limited: slow down"
        );
        assert_eq!(
            SyncError::Config("missing key".into()).to_string(),
            "config: missing key"
        );
    }
}
