//! Route dispatch: one inbound event in, one response out.
//!
//! Every invocation is independent. The handler holds only handles to the
//! store, the push adapter and the clock, so it can serve any number of
//! events concurrently.

use channelcast_core::{
    Environment, InboundEvent, PushAdapter, RelayError, Response, Route, StoreAdapter,
};

use crate::{
    registry::ConnectionRegistry,
    router::{BroadcastRouter, EchoPolicy},
};

/// Maps routed events to registry and router calls.
#[derive(Clone)]
pub struct EventHandler<S: StoreAdapter, P: PushAdapter, E: Environment> {
    registry: ConnectionRegistry<S>,
    router: BroadcastRouter<S, P, E>,
}

impl<S, P, E> EventHandler<S, P, E>
where
    S: StoreAdapter,
    P: PushAdapter,
    E: Environment,
{
    /// Create a handler with all adapters injected.
    pub fn new(store: S, push: P, env: E) -> Self {
        Self {
            registry: ConnectionRegistry::new(store.clone()),
            router: BroadcastRouter::new(store, push, env),
        }
    }

    /// Set who receives a posted message.
    #[must_use]
    pub fn with_echo_policy(mut self, echo: EchoPolicy) -> Self {
        self.router = self.router.with_echo_policy(echo);
        self
    }

    /// Connection registry.
    pub fn registry(&self) -> &ConnectionRegistry<S> {
        &self.registry
    }

    /// Handle one event.
    pub async fn handle(&self, route: Route, event: &InboundEvent) -> Response {
        match route {
            Route::Connect => self.connect(event).await,
            Route::Disconnect => self.disconnect(event).await,
            Route::SendMessage => self.send_message(event).await,
        }
    }

    async fn connect(&self, event: &InboundEvent) -> Response {
        let result: Result<_, RelayError> = async {
            let channel = event.channel()?;
            self.registry.register(channel, &event.connection_id, &event.endpoint()).await
        }
        .await;

        match result {
            Ok(_) => Response::ok("Connected."),
            Err(err) => {
                tracing::warn!(connection_id = %event.connection_id, error = %err, "connect failed");
                Response::from_error("Failed to connect", &err)
            },
        }
    }

    /// Every delete is attempted; any failure makes the response a 500.
    async fn disconnect(&self, event: &InboundEvent) -> Response {
        match self.registry.deregister_by_connection(&event.connection_id).await {
            Ok(report) => match report.failed.first() {
                None => Response::ok("Disconnected."),
                Some((key, err)) => Response::internal(format!(
                    "Failed to disconnect: {} of {} deletes failed, first at {key}: {err}",
                    report.failed.len(),
                    report.failed.len() + report.removed.len(),
                )),
            },
            Err(err) => {
                tracing::warn!(connection_id = %event.connection_id, error = %err, "disconnect failed");
                Response::from_error("Failed to disconnect", &RelayError::from(err))
            },
        }
    }

    async fn send_message(&self, event: &InboundEvent) -> Response {
        let result: Result<_, RelayError> = async {
            let channel = event.channel()?;
            let message = event.message()?;
            self.router
                .handle_inbound(channel, &event.connection_id, message, &event.endpoint())
                .await
        }
        .await;

        match result {
            Ok(report) => {
                tracing::debug!(
                    connection_id = %event.connection_id,
                    delivered = report.delivered.len(),
                    pruned = report.pruned.len(),
                    failed = report.failed.len(),
                    "message sent"
                );
                Response::ok("Data sent.")
            },
            Err(err) => {
                tracing::warn!(connection_id = %event.connection_id, error = %err, "send failed");
                Response::from_error("Failed to send", &err)
            },
        }
    }
}
