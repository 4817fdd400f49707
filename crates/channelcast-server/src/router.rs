//! Broadcast router.
//!
//! Handles one posted message end to end:
//!
//! 1. Validate channel and message
//! 2. Append the message to the channel's log for today
//! 3. List the channel's live connections
//! 4. Push the message to each of them concurrently
//! 5. Prune connections that came back `Gone`
//!
//! A log write failure aborts before anything is pushed. After that point
//! nothing is fatal: each push is isolated, `Gone` is absorbed by the reaper
//! and any other failure is recorded in the [`DeliveryReport`].

use channelcast_core::{
    ChatEntry, Connection, DeliveryOutcome, Environment, PushAdapter, RelayError, StoreAdapter,
    ValidationError,
};
use futures::future::join_all;

use crate::{
    chat_log::ChatLogStore,
    reaper::{ReapOutcome, StaleConnectionReaper},
    registry::ConnectionRegistry,
};

/// Whether the sender receives its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Every other live member of the channel
    #[default]
    ExcludeSender,
    /// Every live member, sender included
    IncludeSender,
}

/// Per-connection results of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the message was handed to
    pub delivered: Vec<String>,
    /// Connections reported gone whose records were removed
    pub pruned: Vec<String>,
    /// Connections reported gone whose records could not all be removed
    pub prune_failed: Vec<String>,
    /// Connections whose push failed otherwise, with the reason
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    /// Number of connections a push was attempted for.
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.pruned.len() + self.prune_failed.len() + self.failed.len()
    }
}

/// Fans a posted message out to a channel.
#[derive(Clone)]
pub struct BroadcastRouter<S: StoreAdapter, P: PushAdapter, E: Environment> {
    registry: ConnectionRegistry<S>,
    chat_log: ChatLogStore<S>,
    reaper: StaleConnectionReaper<S>,
    push: P,
    env: E,
    echo: EchoPolicy,
}

impl<S, P, E> BroadcastRouter<S, P, E>
where
    S: StoreAdapter,
    P: PushAdapter,
    E: Environment,
{
    /// Create a router over `store`, pushing through `push`.
    pub fn new(store: S, push: P, env: E) -> Self {
        let registry = ConnectionRegistry::new(store.clone());
        Self {
            chat_log: ChatLogStore::new(store),
            reaper: StaleConnectionReaper::new(registry.clone()),
            registry,
            push,
            env,
            echo: EchoPolicy::default(),
        }
    }

    /// Set who receives a message.
    #[must_use]
    pub fn with_echo_policy(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Registry the router lists connections from.
    pub fn registry(&self) -> &ConnectionRegistry<S> {
        &self.registry
    }

    /// Log the router appends to.
    pub fn chat_log(&self) -> &ChatLogStore<S> {
        &self.chat_log
    }

    /// Log `message` and deliver it to the live members of `channel`.
    ///
    /// `endpoint_context` is the sender's push endpoint. It is used for any
    /// record that was stored without one.
    ///
    /// # Errors
    ///
    /// - `RelayError::Validation` if `channel` or `message` is empty. Nothing
    ///   is written or pushed.
    /// - `RelayError::Store` if the log write or the connection listing fails.
    ///   Nothing is pushed.
    pub async fn handle_inbound(
        &self,
        channel: &str,
        sender: &str,
        message: &str,
        endpoint_context: &str,
    ) -> Result<DeliveryReport, RelayError> {
        let channel = ValidationError::require("channel", Some(channel))?;
        let message = ValidationError::require("message", Some(message))?;

        self.chat_log.append(channel, ChatEntry::new(sender, message), self.env.now()).await?;

        let connections = self.registry.list_live(channel).await?;
        let recipients: Vec<Connection> = connections
            .into_iter()
            .filter(|c| self.echo == EchoPolicy::IncludeSender || c.connection_id != sender)
            .collect();

        tracing::debug!(channel, sender, recipients = recipients.len(), "broadcasting");

        let pushes = recipients.iter().map(|conn| self.deliver_one(conn, message, endpoint_context));

        let mut report = DeliveryReport::default();
        for (connection_id, result) in join_all(pushes).await {
            match result {
                Delivery::Delivered => report.delivered.push(connection_id),
                Delivery::Pruned => report.pruned.push(connection_id),
                Delivery::PruneFailed => report.prune_failed.push(connection_id),
                Delivery::Failed(reason) => report.failed.push((connection_id, reason)),
            }
        }

        if !report.failed.is_empty() {
            tracing::warn!(channel, failed = report.failed.len(), "some pushes failed");
        }
        Ok(report)
    }

    /// Push to one connection and reap it if it is gone.
    async fn deliver_one(
        &self,
        conn: &Connection,
        message: &str,
        endpoint_context: &str,
    ) -> (String, Delivery) {
        let endpoint =
            if conn.endpoint.is_empty() { endpoint_context } else { conn.endpoint.as_str() };

        let outcome = self.push.deliver(&conn.connection_id, endpoint, message.as_bytes()).await;

        let delivery = match outcome {
            DeliveryOutcome::Delivered => Delivery::Delivered,
            DeliveryOutcome::Gone => {
                tracing::debug!(connection_id = %conn.connection_id, "connection gone");
                match self.reaper.reap(&conn.connection_id).await {
                    ReapOutcome::Pruned => Delivery::Pruned,
                    ReapOutcome::Incomplete => Delivery::PruneFailed,
                }
            },
            DeliveryOutcome::Failed(reason) => {
                tracing::warn!(connection_id = %conn.connection_id, %reason, "push failed");
                Delivery::Failed(reason)
            },
        };

        (conn.connection_id.clone(), delivery)
    }
}

enum Delivery {
    Delivered,
    Pruned,
    PruneFailed,
    Failed(String),
}
