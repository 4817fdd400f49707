//! Push adapter with scripted outcomes.

#![allow(clippy::disallowed_types, reason = "Synchronous bookkeeping only")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use channelcast_core::{DeliveryOutcome, PushAdapter};

/// One recorded delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target connection
    pub connection_id: String,
    /// Endpoint the push went through
    pub endpoint: String,
    /// Payload bytes
    pub payload: Vec<u8>,
    /// What the adapter answered
    pub outcome: DeliveryOutcome,
}

#[derive(Default)]
struct ScriptedPushInner {
    outcomes: HashMap<String, DeliveryOutcome>,
    deliveries: Vec<Delivery>,
}

/// Push adapter that answers from a script and records every attempt.
///
/// Connections without a scripted outcome are delivered. Clones share the
/// same script and log.
#[derive(Clone, Default)]
pub struct ScriptedPush {
    inner: Arc<Mutex<ScriptedPushInner>>,
}

impl ScriptedPush {
    /// Push adapter that delivers everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `outcome` for every push to `connection_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for test
    /// code.
    #[allow(clippy::expect_used)]
    pub fn script(&self, connection_id: &str, outcome: DeliveryOutcome) {
        self.inner
            .lock()
            .expect("Mutex poisoned")
            .outcomes
            .insert(connection_id.to_string(), outcome);
    }

    /// Builder form of [`ScriptedPush::script`].
    #[must_use]
    pub fn with(self, connection_id: &str, outcome: DeliveryOutcome) -> Self {
        self.script(connection_id, outcome);
        self
    }

    /// Every attempt so far, in completion order.
    #[allow(clippy::expect_used)]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.inner.lock().expect("Mutex poisoned").deliveries.clone()
    }

    /// Connections that received a payload, sorted.
    pub fn delivered_to(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .deliveries()
            .into_iter()
            .filter(|d| d.outcome.is_delivered())
            .map(|d| d.connection_id)
            .collect();
        ids.sort();
        ids
    }

    /// Connections a push was attempted to, sorted.
    pub fn attempted(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.deliveries().into_iter().map(|d| d.connection_id).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PushAdapter for ScriptedPush {
    #[allow(clippy::expect_used)]
    async fn deliver(
        &self,
        connection_id: &str,
        endpoint: &str,
        payload: &[u8],
    ) -> DeliveryOutcome {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        let outcome =
            inner.outcomes.get(connection_id).cloned().unwrap_or(DeliveryOutcome::Delivered);

        tracing::trace!(%connection_id, %endpoint, ?outcome, "scripted delivery");

        inner.deliveries.push(Delivery {
            connection_id: connection_id.to_string(),
            endpoint: endpoint.to_string(),
            payload: payload.to_vec(),
            outcome: outcome.clone(),
        });

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_connections_are_delivered() {
        let push = ScriptedPush::new().with("b", DeliveryOutcome::Gone);

        assert_eq!(push.deliver("a", "e/p", b"hi").await, DeliveryOutcome::Delivered);
        assert_eq!(push.deliver("b", "e/p", b"hi").await, DeliveryOutcome::Gone);

        assert_eq!(push.delivered_to(), vec!["a".to_string()]);
        assert_eq!(push.attempted(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(push.deliveries()[0].payload, b"hi".to_vec());
    }
}
