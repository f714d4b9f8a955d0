//! Error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was missing or a value was rejected before dispatch
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Non-2xx response from a remote route; carries the server message verbatim
    #[error("{0}")]
    RemoteError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// A long-running action ended in failure
    #[error("{0}")]
    ActionFailed(String),

    #[error("Action already in progress: {0}")]
    Busy(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Message suitable for a toast
    ///
    /// Remote and validation errors are shown without the variant prefix so the
    /// user sees exactly what the server (or the form check) reported.
    pub fn user_message(&self) -> String {
        match self {
            Error::ValidationError(msg) | Error::RemoteError(msg) | Error::ActionFailed(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::HttpError(err.to_string())
    }
}

// Convert anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
