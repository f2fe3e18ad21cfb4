//! airpipe-relay binary entry point.
//!
//! Usage:
//! ```bash
//! airpipe-relay --config relay.toml
//! RUST_LOG=debug airpipe-relay
//! ```

use airpipe_relay::{serve, Config, PipeRelay};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match get_config_path() {
        Some(path) => Config::from_file(&path)?,
        None => Config::default(),
    };

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;

    tracing::info!("airpipe-relay v{}", env!("CARGO_PKG_VERSION"));
    let relay = Arc::new(PipeRelay::new(config));

    tokio::select! {
        result = serve(listener, Arc::clone(&relay)) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    let metrics = relay.metrics();
    tracing::info!(
        "Served {} connections, {} pairings, {} bytes forwarded",
        metrics.connections_total.load(std::sync::atomic::Ordering::Relaxed),
        metrics.pairings_total.load(std::sync::atomic::Ordering::Relaxed),
        metrics.bytes_forwarded.load(std::sync::atomic::Ordering::Relaxed),
    );
    Ok(())
}

fn get_config_path() -> Option<PathBuf> {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
}
