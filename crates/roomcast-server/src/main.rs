//! Roomcast server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! roomcast-server --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate (production)
//! roomcast-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use std::time::Duration;

use clap::Parser;
use roomcast_core::RelayConfig;
use roomcast_server::{Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Roomcast relay server
#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Room-based message relay over QUIC")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds a new connection has to send its Join
    #[arg(long, default_value = "5")]
    join_timeout_secs: u64,

    /// Seconds without any frame before a client is dropped
    #[arg(long, default_value = "10")]
    pong_wait_secs: u64,

    /// Per-connection outbound queue capacity
    #[arg(long, default_value = "256")]
    outbound_queue: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!(bind = %args.bind, "roomcast server starting");

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided, using self-signed certificate");
    }

    let relay = RelayConfig { outbound_queue_capacity: args.outbound_queue, ..Default::default() }
        .with_pong_wait(Duration::from_secs(args.pong_wait_secs));

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        join_timeout: Duration::from_secs(args.join_timeout_secs),
        max_connections: args.max_connections,
        relay,
    };

    let server = Server::bind(config)?;

    tracing::info!(addr = %server.local_addr()?, "server listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}
