//! Stale connection reaper.
//!
//! Invoked inline by the broadcast router when a push comes back `Gone`. It
//! removes every record of the unreachable connection. Its own failures are
//! logged and swallowed: the stale record stays behind and the next broadcast
//! that hits it tries again.

use channelcast_core::StoreAdapter;

use crate::registry::{ConnectionRegistry, DeregisterReport};

/// Prunes records of connections the push adapter reported as gone.
#[derive(Clone)]
pub struct StaleConnectionReaper<S: StoreAdapter> {
    registry: ConnectionRegistry<S>,
}

/// What a reap achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Every record of the connection is gone
    Pruned,
    /// Some or all records are still there
    Incomplete,
}

impl<S: StoreAdapter> StaleConnectionReaper<S> {
    /// Create a reaper deregistering through `registry`.
    pub fn new(registry: ConnectionRegistry<S>) -> Self {
        Self { registry }
    }

    /// Remove every record of `connection_id`. Never fails.
    pub async fn reap(&self, connection_id: &str) -> ReapOutcome {
        match self.registry.deregister_by_connection(connection_id).await {
            Ok(DeregisterReport { failed, .. }) if failed.is_empty() => {
                tracing::info!(connection_id, "pruned stale connection");
                ReapOutcome::Pruned
            },
            Ok(report) => {
                tracing::warn!(
                    connection_id,
                    removed = report.removed.len(),
                    failed = report.failed.len(),
                    "stale connection partially pruned"
                );
                ReapOutcome::Incomplete
            },
            Err(err) => {
                tracing::warn!(connection_id, error = %err, "stale connection lookup failed");
                ReapOutcome::Incomplete
            },
        }
    }
}
