//! Bus error types.

use thiserror::Error;

/// Failure reported by (or captured from) a subscriber handler.
///
/// Handler errors never reach the publisher. They are isolated per handler,
/// fed to the retry manager and finally surfaced as a `message-error` event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler returned a failure.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The payload could not be decoded into the handler's type.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The receiving side of a channel subscription is gone.
    #[error("subscriber channel closed")]
    Closed,
}

impl HandlerError {
    /// Convenience constructor for handler-reported failures.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors returned by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A typed payload could not be serialized.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `start()` was called on a bus whose workers are already running.
    #[error("bus workers already started")]
    AlreadyStarted,

    /// The bus configuration is invalid.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
