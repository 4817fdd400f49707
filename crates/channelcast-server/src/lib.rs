//! Channelcast server.
//!
//! Channel-scoped message fan-out over a key-value store. Clients join a
//! channel, post messages, and every other live member of that channel gets
//! the message pushed to it. Members whose push comes back `Gone` are pruned.
//! Every message is also appended to a per-channel, per-day log.
//!
//! # Components
//!
//! - [`ConnectionRegistry`]: membership records, register/list/deregister
//! - [`ChatLogStore`]: day-bucketed append log
//! - [`StaleConnectionReaper`]: prunes connections reported gone
//! - [`BroadcastRouter`]: log, list, push, reap
//! - [`EventHandler`]: route dispatch, event in and response out
//! - [`SessionGateway`]: in-process push adapter with per-session outboxes
//! - [`Server`]: newline-delimited JSON runtime tying it all together
//! - [`storage`]: memory, redb and chaotic store backends
//!
//! # Wire format
//!
//! The runtime reads one JSON envelope per line:
//!
//! ```json
//! {"route":"$connect","channel":"lobby","connectionId":"a","domainName":"host","stage":"dev"}
//! {"route":"sendmessage","channel":"lobby","message":"hi","connectionId":"a","domainName":"host","stage":"dev"}
//! ```
//!
//! and writes one JSON record per line, either a response to an envelope or a
//! message pushed to a session:
//!
//! ```json
//! {"type":"response","connectionId":"a","route":"$connect","statusCode":200,"body":"Connected."}
//! {"type":"push","connectionId":"b","message":"hi"}
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod chat_log;
mod error;
mod gateway;
mod handler;
mod reaper;
mod registry;
mod router;
pub mod storage;
mod system_env;

use std::{collections::BTreeSet, path::PathBuf};

pub use chat_log::ChatLogStore;
use channelcast_core::{Environment, InboundEvent, Response, Route, StoreAdapter};
pub use error::ServerError;
pub use gateway::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_OUTBOX_CAPACITY, SessionGateway};
pub use handler::EventHandler;
pub use reaper::{ReapOutcome, StaleConnectionReaper};
pub use registry::{ConnectionRegistry, DeregisterReport};
pub use router::{BroadcastRouter, DeliveryReport, EchoPolicy};
use serde::{Deserialize, Serialize};
pub use storage::{ChaoticStore, ContentStore, MemoryStore, RedbStore};
pub use system_env::SystemEnv;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc,
    task::JoinSet,
};

/// Capacity of the queue in front of the output writer.
const OUTPUT_QUEUE_CAPACITY: usize = 1024;

/// Server configuration for the runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// Who receives a posted message
    pub echo_policy: EchoPolicy,
    /// Largest payload pushed to a session
    pub max_payload_bytes: usize,
    /// Messages queued per session before pushes fail
    pub outbox_capacity: usize,
    /// Remove connection records left by a previous process at startup
    pub prune_on_start: bool,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            echo_policy: EchoPolicy::default(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            prune_on_start: false,
        }
    }
}

/// One input line: a route plus the event fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handler to invoke
    pub route: Route,
    /// Event fields
    #[serde(flatten)]
    pub event: InboundEvent,
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Output {
    /// Result of handling an envelope
    #[serde(rename_all = "camelCase")]
    Response {
        /// Session the envelope came from
        connection_id: String,
        /// Route it was sent to
        route: Route,
        /// 200, 400 or 500
        status_code: u16,
        /// Human-readable body
        body: String,
    },
    /// Message pushed to a session
    #[serde(rename_all = "camelCase")]
    Push {
        /// Receiving session
        connection_id: String,
        /// Message text
        message: String,
    },
}

impl Output {
    fn response(route: Route, event: &InboundEvent, response: Response) -> Self {
        Self::Response {
            connection_id: event.connection_id.clone(),
            route,
            status_code: response.status_code,
            body: response.body,
        }
    }
}

/// What startup recovery found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Connection records present at startup
    pub found: usize,
    /// Records removed because `prune_on_start` was set
    pub pruned: usize,
}

/// Channelcast runtime.
///
/// Owns the event handler and the session gateway. Clone is cheap; every
/// spawned invocation works on a clone.
#[derive(Clone)]
pub struct Server<S: StoreAdapter = ContentStore, E: Environment = SystemEnv> {
    handler: EventHandler<S, SessionGateway, E>,
    gateway: SessionGateway,
    config: ServerRuntimeConfig,
}

impl Server {
    /// Open the configured store and run startup recovery.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` for a zero outbox capacity
    /// - `ServerError::Store` if the store cannot be opened or scanned
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let store = ContentStore::open(config.database_path.as_deref())?;
        if store.is_durable() {
            tracing::info!(path = ?config.database_path, "using durable store");
        } else {
            tracing::info!("using in-memory store");
        }

        let server = Self::with_parts(store, SystemEnv::new(), config)?;
        server.recover().await?;
        Ok(server)
    }
}

impl<S: StoreAdapter, E: Environment> Server<S, E> {
    /// Build a server over an existing store and clock.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` for a zero outbox capacity.
    pub fn with_parts(store: S, env: E, config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.outbox_capacity == 0 {
            return Err(ServerError::Config("outbox capacity must be non-zero".to_string()));
        }

        let gateway = SessionGateway::new(config.outbox_capacity, config.max_payload_bytes);
        let handler = EventHandler::new(store, gateway.clone(), env)
            .with_echo_policy(config.echo_policy);

        Ok(Self { handler, gateway, config })
    }

    /// Event handler used for every envelope.
    pub fn handler(&self) -> &EventHandler<S, SessionGateway, E> {
        &self.handler
    }

    /// Session gateway pushes are delivered through.
    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    /// Count the connection records already in the store and, with
    /// `prune_on_start`, remove them.
    ///
    /// Records of a previous process point at outboxes that no longer exist.
    /// Without pruning they are removed lazily, the first time a broadcast
    /// reaches them.
    ///
    /// # Errors
    ///
    /// `ServerError::Store` if the scan fails. Individual delete failures are
    /// logged and leave the record for lazy pruning.
    pub async fn recover(&self) -> Result<RecoveryReport, ServerError> {
        let registry = self.handler.registry();
        let connections = registry.list_all().await?;

        let mut report = RecoveryReport { found: connections.len(), pruned: 0 };
        tracing::info!(found = report.found, "connection records at startup");

        if !self.config.prune_on_start {
            return Ok(report);
        }

        let ids: BTreeSet<String> = connections.into_iter().map(|c| c.connection_id).collect();
        for connection_id in ids {
            match registry.deregister_by_connection(&connection_id).await {
                Ok(deregistered) => report.pruned += deregistered.removed.len(),
                Err(err) => {
                    tracing::warn!(%connection_id, error = %err, "startup prune failed");
                },
            }
        }

        tracing::info!(pruned = report.pruned, "pruned connection records from previous run");
        Ok(report)
    }

    /// Handle one envelope, opening or closing the session's outbox around
    /// connect and disconnect.
    ///
    /// Pushes to the session are forwarded to `output` until its outbox
    /// closes. The response is returned, not sent.
    pub async fn dispatch(&self, envelope: &Envelope, output: &mpsc::Sender<Output>) -> Response {
        let Envelope { route, event } = envelope;
        let connection_id = event.connection_id.as_str();

        match route {
            Route::Connect => {
                // A session already live keeps its outbox whatever this connect
                // returns; only an outbox opened here is closed on failure.
                let opened = match self.gateway.open(connection_id).await {
                    Some(outbox) => {
                        tokio::spawn(forward_pushes(
                            connection_id.to_string(),
                            outbox,
                            output.clone(),
                        ));
                        true
                    },
                    None => false,
                };

                let response = self.handler.handle(*route, event).await;
                if opened && !response.is_success() {
                    self.gateway.close(connection_id).await;
                }
                response
            },
            Route::Disconnect => {
                let response = self.handler.handle(*route, event).await;
                self.gateway.close(connection_id).await;
                response
            },
            Route::SendMessage => self.handler.handle(*route, event).await,
        }
    }

    /// Serve envelopes read from `input`, writing outputs to `output`.
    ///
    /// Each line is handled as an independent task. Malformed lines are logged
    /// and skipped. At end of input the runtime waits for in-flight events,
    /// closes every outbox, drains pending pushes and returns.
    ///
    /// # Errors
    ///
    /// - `ServerError::Transport` if reading or writing fails
    /// - `ServerError::Internal` if an event task panicked
    pub async fn run<R, W>(self, input: R, output: W) -> Result<(), ServerError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        let writer = tokio::spawn(write_outputs(output, rx));

        let mut lines = BufReader::new(input).lines();
        let mut tasks = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let envelope: Envelope = match serde_json::from_str(line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed envelope");
                    continue;
                },
            };

            let server = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let response = server.dispatch(&envelope, &tx).await;
                let output = Output::response(envelope.route, &envelope.event, response);
                if tx.send(output).await.is_err() {
                    tracing::warn!("output writer stopped, response dropped");
                }
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.map_err(|e| ServerError::Internal(format!("event task failed: {e}")))?;
        }

        let closed = self.gateway.close_all().await;
        tracing::debug!(closed, "input closed, outboxes closed");

        drop(tx);
        writer.await.map_err(|e| ServerError::Internal(format!("writer task failed: {e}")))?
    }
}

/// Copy everything pushed into a session's outbox to the output.
async fn forward_pushes(
    connection_id: String,
    mut outbox: mpsc::Receiver<bytes::Bytes>,
    output: mpsc::Sender<Output>,
) {
    while let Some(payload) = outbox.recv().await {
        let message = String::from_utf8_lossy(&payload).into_owned();
        let push = Output::Push { connection_id: connection_id.clone(), message };
        if output.send(push).await.is_err() {
            break;
        }
    }
    tracing::trace!(%connection_id, "push forwarder finished");
}

/// Single writer so output lines never interleave.
async fn write_outputs<W>(mut output: W, mut rx: mpsc::Receiver<Output>) -> Result<(), ServerError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(record) = rx.recv().await {
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| ServerError::Internal(format!("output encoding failed: {e}")))?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    output.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_event_fields() {
        let line = r#"{"route":"sendmessage","channel":"lobby","message":"hi","connectionId":"a","domainName":"host","stage":"dev"}"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();

        assert_eq!(envelope.route, Route::SendMessage);
        assert_eq!(envelope.event.channel.as_deref(), Some("lobby"));
        assert_eq!(envelope.event.endpoint(), "host/dev");
    }

    #[test]
    fn output_records_are_tagged() {
        let push = Output::Push { connection_id: "b".to_string(), message: "hi".to_string() };
        assert_eq!(
            serde_json::to_string(&push).unwrap(),
            r#"{"type":"push","connectionId":"b","message":"hi"}"#
        );
    }

    #[test]
    fn zero_outbox_capacity_is_a_config_error() {
        let config = ServerRuntimeConfig { outbox_capacity: 0, ..Default::default() };
        let result = Server::with_parts(MemoryStore::new(), SystemEnv::new(), config);

        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
