//! Error type

use thiserror::Error;

/// Result specialization for protocol errors
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while running a protocol
#[derive(Debug, Error)]
pub enum Error {
    /// Occurs when an expected message does not arrive in time
    #[error("timed out waiting for a message")]
    Timeout,
    /// Occurs when the protocol run was cancelled
    #[error("protocol run was cancelled")]
    Cancelled,
    /// Occurs when a peer's channel is gone
    #[error("node {0} is unreachable")]
    Disconnected(usize),
    /// Occurs when a node instance panicked
    #[error("a protocol instance panicked")]
    Panicked,
    /// Occurs when a node lacks the input its role requires
    #[error("missing protocol input: {0}")]
    MissingInput(&'static str),
    /// Occurs when a message arrives that the current state does not expect
    #[error("unexpected message from node {0}")]
    UnexpectedMessage(usize),
    /// Occurs when a peer's proof does not verify
    #[error("{0} proof from node {1} failed verification")]
    BadProof(&'static str, usize),
    /// Occurs when the tree or roster is unusable
    #[error("invalid tree: {0}")]
    InvalidTree(&'static str),
    /// Occurs when a cryptographic operation fails
    #[error(transparent)]
    Curve(#[from] unlynx_curve::Error),
    /// Occurs when a message cannot be encoded or decoded
    #[error(transparent)]
    Serde(#[from] unlynx_serde::Error),
}

impl Error {
    /// Whether this error only reflects another failure or a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
