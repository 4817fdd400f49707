//! Server error types.

use std::fmt;

use channelcast_core::StoreError;

/// Errors that can occur in the server runtime.
///
/// Per-event failures never show up here; they become error responses. These
/// are the failures that stop the runtime itself.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (unusable database path, invalid limits).
    ///
    /// Fatal; fix configuration and restart.
    Config(String),

    /// Transport error (reading input or writing output failed).
    ///
    /// Fatal for the runtime loop.
    Transport(String),

    /// Store error during startup recovery.
    Store(StoreError),

    /// Internal error (a task panicked or an output could not be encoded).
    ///
    /// Indicates a bug.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Store(err) => write!(f, "store error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
