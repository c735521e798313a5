//! Error types for carhaul-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid content identifier (bad string, bytes, or codec)
    #[error("Invalid cid: {0}")]
    InvalidCid(String),

    /// Invalid CAR stream
    #[error("Invalid CAR: {0}")]
    InvalidCar(String),

    /// Invalid side-index artifact
    #[error("Invalid side index: {0}")]
    InvalidSideIndex(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid-cid error
    pub fn invalid_cid(msg: impl Into<String>) -> Self {
        Error::InvalidCid(msg.into())
    }

    /// Create an invalid-CAR error
    pub fn invalid_car(msg: impl Into<String>) -> Self {
        Error::InvalidCar(msg.into())
    }

    /// Create an invalid-side-index error
    pub fn invalid_side_index(msg: impl Into<String>) -> Self {
        Error::InvalidSideIndex(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

impl From<crate::car::CarError> for Error {
    fn from(err: crate::car::CarError) -> Self {
        Error::InvalidCar(err.to_string())
    }
}

impl From<crate::side_index::SideIndexError> for Error {
    fn from(err: crate::side_index::SideIndexError) -> Self {
        Error::InvalidSideIndex(err.to_string())
    }
}
