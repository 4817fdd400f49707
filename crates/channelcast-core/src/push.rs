//! Push contract.
//!
//! The push primitive is an opaque capability: deliver bytes to a connection
//! through its endpoint, and say how it went. Every outcome is a value, so the
//! router has to handle each one explicitly.

use async_trait::async_trait;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Payload handed to the connection
    Delivered,

    /// The connection no longer exists at its endpoint.
    ///
    /// Transport-level "not found / expired". The router prunes the
    /// connection's records when it sees this.
    Gone,

    /// Any other failure (throttling, oversize payload, network).
    ///
    /// Terminal for this delivery; there is no retry.
    Failed(String),
}

impl DeliveryOutcome {
    /// Returns true for [`DeliveryOutcome::Delivered`].
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Outbound push capability.
///
/// Timeouts, if any, are the implementation's business. The router awaits
/// whatever it returns.
#[async_trait]
pub trait PushAdapter: Clone + Send + Sync + 'static {
    /// Deliver `payload` to `connection_id` via `endpoint`.
    async fn deliver(&self, connection_id: &str, endpoint: &str, payload: &[u8])
    -> DeliveryOutcome;
}
