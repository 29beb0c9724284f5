//! Error type

use thiserror::Error;

/// Result specialization for serialization errors
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by serialization/deserialization
#[derive(Debug, Error)]
pub enum Error {
    /// Occurs when serialization into or deserialization from bytes fails
    #[error("bad byte encoding: {0}")]
    Bytes(#[from] bincode::Error),
    /// Occurs when deserialization from base64 fails
    #[error("bad base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Occurs when a decoded value is not a valid group element or scalar
    #[error("decoded bytes do not represent a valid {0}")]
    Invalid(&'static str),
}

impl From<Error> for std::fmt::Error {
    fn from(_: Error) -> Self {
        std::fmt::Error
    }
}
