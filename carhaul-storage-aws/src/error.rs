//! Error types for the AWS adapters

use thiserror::Error;

/// Errors from object-store and block-index-table operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O or network error
    #[error("I/O error: {0}")]
    Io(String),

    /// Resource not found (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Throttled / retryable server error
    #[error("Throttled: {0}")]
    Throttled(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 SDK error
    #[error("S3 error: {0}")]
    S3(String),

    /// DynamoDB SDK error
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
}

impl StorageError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn s3(msg: impl Into<String>) -> Self {
        Self::S3(msg.into())
    }

    pub fn dynamodb(msg: impl Into<String>) -> Self {
        Self::DynamoDb(msg.into())
    }

    /// Whether this error is a 404-style absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for AWS adapter operations
pub type Result<T> = std::result::Result<T, StorageError>;
