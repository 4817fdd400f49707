//! In-process push gateway.
//!
//! Stands in for a remote connection-management API when the server runs as a
//! single process. Each connected session gets a bounded outbox; the runtime
//! drains it onto the session's output. A session without an open outbox is
//! `Gone`, which is exactly what a remote API says about an expired session.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use channelcast_core::{DeliveryOutcome, PushAdapter};
use tokio::sync::{RwLock, mpsc};

/// Default outbox capacity per session.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Default largest payload accepted for delivery.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 128 * 1024;

/// Push adapter delivering into per-session in-memory outboxes.
///
/// Clone is cheap (Arc); clones share the same sessions.
#[derive(Clone)]
pub struct SessionGateway {
    outboxes: Arc<RwLock<HashMap<String, mpsc::Sender<Bytes>>>>,
    capacity: usize,
    max_payload_bytes: usize,
}

impl SessionGateway {
    /// Gateway with `capacity` messages per outbox and a payload limit.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, max_payload_bytes: usize) -> Self {
        assert!(capacity > 0, "outbox capacity must be non-zero");
        Self { outboxes: Arc::new(RwLock::new(HashMap::new())), capacity, max_payload_bytes }
    }

    /// Open an outbox for `connection_id` and return its receiving end.
    ///
    /// Returns `None` if the session already has an open outbox; the existing
    /// one keeps receiving.
    pub async fn open(&self, connection_id: &str) -> Option<mpsc::Receiver<Bytes>> {
        let mut outboxes = self.outboxes.write().await;
        if outboxes.get(connection_id).is_some_and(|tx| !tx.is_closed()) {
            return None;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        outboxes.insert(connection_id.to_string(), tx);
        tracing::trace!(connection_id, "outbox opened");
        Some(rx)
    }

    /// Close the outbox of `connection_id`. Returns false if none was open.
    ///
    /// Messages already queued are still drained by the receiver.
    pub async fn close(&self, connection_id: &str) -> bool {
        let removed = self.outboxes.write().await.remove(connection_id).is_some();
        if removed {
            tracing::trace!(connection_id, "outbox closed");
        }
        removed
    }

    /// Close every outbox. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let mut outboxes = self.outboxes.write().await;
        let count = outboxes.len();
        outboxes.clear();
        count
    }

    /// Number of sessions with an outbox.
    pub async fn session_count(&self) -> usize {
        self.outboxes.read().await.len()
    }
}

impl Default for SessionGateway {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY, DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

#[async_trait]
impl PushAdapter for SessionGateway {
    async fn deliver(
        &self,
        connection_id: &str,
        _endpoint: &str,
        payload: &[u8],
    ) -> DeliveryOutcome {
        let outboxes = self.outboxes.read().await;
        let Some(tx) = outboxes.get(connection_id) else {
            return DeliveryOutcome::Gone;
        };

        if payload.len() > self.max_payload_bytes {
            return DeliveryOutcome::Failed("payload too large".to_string());
        }

        match tx.try_send(Bytes::copy_from_slice(payload)) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                DeliveryOutcome::Failed("outbox full".to_string())
            },
            Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Gone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_is_gone() {
        let gateway = SessionGateway::default();
        assert_eq!(gateway.deliver("nobody", "host/dev", b"hi").await, DeliveryOutcome::Gone);
    }

    #[tokio::test]
    async fn delivers_into_outbox() {
        let gateway = SessionGateway::default();
        let mut rx = gateway.open("a").await.unwrap();

        assert_eq!(gateway.deliver("a", "host/dev", b"hi").await, DeliveryOutcome::Delivered);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn dropped_receiver_is_gone() {
        let gateway = SessionGateway::default();
        drop(gateway.open("a").await.unwrap());

        assert_eq!(gateway.deliver("a", "host/dev", b"hi").await, DeliveryOutcome::Gone);
    }

    #[tokio::test]
    async fn closed_session_is_gone() {
        let gateway = SessionGateway::default();
        let _rx = gateway.open("a").await.unwrap();

        assert!(gateway.close("a").await);
        assert!(!gateway.close("a").await);
        assert_eq!(gateway.deliver("a", "host/dev", b"hi").await, DeliveryOutcome::Gone);
    }

    #[tokio::test]
    async fn oversize_and_full_are_failures() {
        let gateway = SessionGateway::new(1, 4);
        let _rx = gateway.open("a").await.unwrap();

        assert_eq!(
            gateway.deliver("a", "host/dev", b"too long").await,
            DeliveryOutcome::Failed("payload too large".to_string())
        );
        assert_eq!(gateway.deliver("a", "host/dev", b"one").await, DeliveryOutcome::Delivered);
        assert_eq!(
            gateway.deliver("a", "host/dev", b"two").await,
            DeliveryOutcome::Failed("outbox full".to_string())
        );
    }

    #[tokio::test]
    async fn reopen_keeps_live_outbox() {
        let gateway = SessionGateway::default();
        let _rx = gateway.open("a").await.unwrap();

        assert!(gateway.open("a").await.is_none());
        assert_eq!(gateway.session_count().await, 1);
    }
}
