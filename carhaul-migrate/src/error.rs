//! Worker error taxonomy.
//!
//! Four kinds, mapped to response statuses: the caller's fault (400), a
//! missing source (404), a content-identity mismatch (500, after aborting
//! any in-flight multipart upload), and everything the stores throw at us
//! (500). Transient upstream failures are retried where they occur (table
//! batch loops, SDK retry config, the driver CLI); whatever reaches this
//! type is final for the current attempt.

use carhaul_storage_aws::StorageError;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Worker error taxonomy
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Missing or invalid request parameter
    #[error("invalid request: {0}")]
    Validation(String),

    /// Source object missing or empty
    #[error("not found: {0}")]
    NotFound(String),

    /// Streamed bytes do not hash to the asserted shard cid
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Object store or table failure
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl MigrateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Integrity(_) | Self::Upstream(_) => 500,
        }
    }

    /// Whether a retry of the whole operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

impl From<StorageError> for MigrateError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MigrateError::validation("x").status(), 400);
        assert_eq!(MigrateError::not_found("x").status(), 404);
        assert_eq!(MigrateError::integrity("x").status(), 500);
        assert_eq!(MigrateError::upstream("x").status(), 500);
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: MigrateError = StorageError::not_found("gone").into();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_storage_other_maps_to_upstream() {
        let err: MigrateError = StorageError::s3("boom").into();
        assert!(matches!(err, MigrateError::Upstream(_)));
        assert!(err.is_retryable());
    }
}
