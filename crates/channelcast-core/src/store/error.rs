//! Store error types.
//!
//! Defines errors that can occur during store operations:
//! - `Io`: Underlying storage system errors
//! - `Serialization`: Failed to encode/decode an item at rest
//! - `UnknownIndex`: Query against an index the store was not built with
//! - `Malformed`: Item exists but does not decode into the expected record

use thiserror::Error;

use super::ItemKey;

/// Errors that can occur during store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// I/O error (file system, database, network, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Secondary index was not registered with the store
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// Stored item is missing attributes the record requires
    #[error("malformed item {key}: {reason}")]
    Malformed {
        /// Key of the offending item
        key: ItemKey,
        /// What was wrong with it
        reason: String,
    },
}

impl StoreError {
    /// Malformed-item error for `key`.
    pub fn malformed(key: &ItemKey, reason: impl Into<String>) -> Self {
        Self::Malformed { key: key.clone(), reason: reason.into() }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}
