//! Error type

use thiserror::Error;

/// Result specialization for UnLynx cryptographic errors
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the UnLynx cryptographic primitives
#[derive(Debug, Error)]
pub enum Error {
    /// Occurs when a zero-knowledge proof or commitment does not verify
    #[error("proof verification failed")]
    BadProof,
    /// Occurs when a decrypted point is outside the searchable plaintext range
    #[error("plaintext is outside of the decryptable range")]
    PlaintextOutOfRange,
    /// Occurs when two vectors that must have the same length do not
    #[error("length mismatch: {0} != {1}")]
    LengthMismatch(usize, usize),
    /// Occurs when a vector of indices is not a permutation
    #[error("not a valid permutation")]
    InvalidPermutation,
    /// Occurs when an operation requires a non-empty input
    #[error("empty input")]
    Empty,
    /// Occurs when a numeric parameter is outside its domain
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// Occurs when encoding or decoding fails
    #[error(transparent)]
    Serde(#[from] unlynx_serde::Error),
    /// Occurs when reading or writing precomputed material fails
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
