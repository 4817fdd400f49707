//! Channelcast server binary.
//!
//! Reads newline-delimited JSON envelopes on stdin and writes responses and
//! pushes on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral, everything in memory
//! channelcast-server
//!
//! # Durable, dropping sessions left by the previous run
//! channelcast-server --database channelcast.redb --prune-on-start
//! ```

use std::path::PathBuf;

use channelcast_server::{
    DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_OUTBOX_CAPACITY, EchoPolicy, Server, ServerRuntimeConfig,
};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Channel-scoped message fan-out server
#[derive(Parser, Debug)]
#[command(name = "channelcast-server")]
#[command(about = "Channel-scoped message fan-out server")]
#[command(version)]
struct Args {
    /// Database file (in-memory if omitted)
    #[arg(short, long, env = "CHANNELCAST_DATABASE")]
    database: Option<PathBuf>,

    /// Deliver messages back to their sender too
    #[arg(long, env = "CHANNELCAST_ECHO_SENDER")]
    echo_sender: bool,

    /// Largest message pushed to a session, in bytes
    #[arg(long, env = "CHANNELCAST_MAX_PAYLOAD_BYTES", default_value_t = DEFAULT_MAX_PAYLOAD_BYTES)]
    max_payload_bytes: usize,

    /// Messages queued per session before pushes fail
    #[arg(long, env = "CHANNELCAST_OUTBOX_CAPACITY", default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,

    /// Remove connection records left by a previous run at startup
    #[arg(long, env = "CHANNELCAST_PRUNE_ON_START")]
    prune_on_start: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CHANNELCAST_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries the protocol
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::info!("Channelcast server starting");

    let config = ServerRuntimeConfig {
        database_path: args.database,
        echo_policy: if args.echo_sender {
            EchoPolicy::IncludeSender
        } else {
            EchoPolicy::ExcludeSender
        },
        max_payload_bytes: args.max_payload_bytes,
        outbox_capacity: args.outbox_capacity,
        prune_on_start: args.prune_on_start,
    };

    let server = Server::bind(config).await?;

    server.run(tokio::io::stdin(), tokio::io::stdout()).await?;

    tracing::info!("Channelcast server stopped");
    Ok(())
}
