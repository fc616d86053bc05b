//! # DocBridge Server
//!
//! Accept HTTP-like requests on a fixed port and translate them into inserts
//! and full scans against one document collection.
//!
//! ## Design Principles
//!
//! 1. **Single Responsibility**: Framing, dispatch and encoding live in modules.
//! 2. **One Store Handle**: The store is connected once here and released once
//!    on shutdown.
//! 3. **Fatal Startup, Resilient Loop**: Startup failures exit the process;
//!    per-request failures are answered and logged.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use docbridge_server::config::Config;
use docbridge_server::server::{self, Server};

const DEFAULT_LOG_FILTER: &str = "info,docbridge=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    run().await.inspect_err(|err| error!(error = %format!("{err:#}"), "docbridge failed"))
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    let store_config = config.store.clone();
    // The MongoDB driver's sync API must not run on a runtime worker.
    let store = tokio::task::spawn_blocking(move || docbridge_store::connect(&store_config))
        .await
        .context("store connect task panicked")?
        .with_context(|| format!("failed to connect to store {}", config.store.backend))?;

    let listener = server::bind_listener(config.listen_addr, config.backlog)
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;
    info!(
        addr = %config.listen_addr,
        backlog = config.backlog,
        max_connections = config.settings.max_connections,
        store = %store.describe(),
        "docbridge listening"
    );

    let server = Server::new(listener, Arc::clone(&store), config.settings);
    let metrics = server.metrics();
    server.serve_until(shutdown_signal()).await;

    let snapshot = metrics.snapshot();
    info!(
        connections = snapshot.connections_total,
        inserted = snapshot.documents_inserted,
        scans = snapshot.scans_total,
        streamed = snapshot.documents_streamed,
        client_errors = snapshot.client_errors,
        server_errors = snapshot.server_errors,
        mean_latency_us = snapshot.latency.mean().as_micros() as u64,
        latency_buckets = %snapshot.latency.bucket_summary(),
        "server stopped"
    );

    tokio::task::spawn_blocking(move || store.disconnect())
        .await
        .context("store disconnect task panicked")?
        .context("failed to disconnect store")?;
    info!("store disconnected");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received interrupt"),
        Err(err) => {
            // Without a signal handler the server can only be killed.
            error!(error = %err, "failed to install interrupt handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert_eq!(DEFAULT_LOG_FILTER, "info,docbridge=info");
    }
}
