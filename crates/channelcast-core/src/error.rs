//! Error types for the fan-out core.
//!
//! Two layers:
//! - [`ValidationError`]: malformed or missing caller input. Surfaced as a
//!   400-equivalent, never retried, never triggers cleanup.
//! - [`RelayError`]: what a registry, log or router operation can fail with.
//!   Either a validation failure or a store failure (500-equivalent).
//!
//! "Connection gone" is deliberately absent. It is a delivery outcome
//! ([`crate::DeliveryOutcome::Gone`]) recovered locally by the router, not an
//! error.

use thiserror::Error;

use crate::store::StoreError;

/// Required input was missing or empty.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("missing required parameter: '{field}'")]
pub struct ValidationError {
    /// Name of the offending field as it appears on the wire
    pub field: &'static str,
}

impl ValidationError {
    /// Validation error for `field`.
    pub fn missing(field: &'static str) -> Self {
        Self { field }
    }

    /// Return `value` if it is present and non-empty.
    pub fn require<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, Self> {
        match value {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Self::missing(field)),
        }
    }
}

/// Errors from registry, chat log and broadcast operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Caller input rejected before any store mutation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Store adapter failed. Not retried.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl RelayError {
    /// HTTP-style status code for the response shape.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Store(_) => 500,
        }
    }

    /// Returns true if the caller sent bad input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
