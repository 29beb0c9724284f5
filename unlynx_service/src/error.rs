//! Error type

use crate::messages::SurveyId;
use thiserror::Error;

/// Result specialization for service errors
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the service and its clients
#[derive(Debug, Error)]
pub enum Error {
    /// Occurs when a query names a survey this server does not hold
    #[error("unknown survey {0}")]
    UnknownSurvey(SurveyId),
    /// Occurs when a server is not part of the roster it is asked to work with
    #[error("server {0} is not in the roster")]
    NotInRoster(String),
    /// Occurs when a survey query is malformed
    #[error("invalid query: {0}")]
    InvalidQuery(&'static str),
    /// Occurs when a filtering predicate cannot be parsed or evaluated
    #[error("invalid predicate: {0}")]
    Predicate(String),
    /// Occurs when a survey waits too long for data providers or servers
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// Occurs when another server's part of the survey round failed
    #[error("survey round aborted")]
    Aborted,
    /// Occurs when a phase produced no result where one was expected
    #[error("no result from the {0} phase")]
    MissingResult(&'static str),
    /// Occurs when the configuration cannot be parsed
    #[error(transparent)]
    Config(#[from] toml::de::Error),
    /// Occurs when a file cannot be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Occurs when a protocol run fails
    #[error(transparent)]
    Protocol(#[from] unlynx_protocols::Error),
    /// Occurs when a cryptographic operation fails
    #[error(transparent)]
    Curve(#[from] unlynx_curve::Error),
    /// Occurs when a message cannot be encoded or decoded
    #[error(transparent)]
    Serde(#[from] unlynx_serde::Error),
}
