//! Meshlog Server
//!
//! Main entry point for a meshlog node: it opens the local commit log,
//! serves it over gRPC, and replicates from any statically configured
//! peers.
//!
//! ## Configuration
//!
//! All configuration is done via environment variables:
//!
//! - `MESHLOG_ADDR`: bind address for the gRPC server (default: 0.0.0.0:8400)
//! - `MESHLOG_ADVERTISE_ADDR`: address this node dials itself at, used by
//!   the replicator to re-produce peer records (default: 127.0.0.1:8400)
//! - `MESHLOG_DATA_DIR`: log directory (default: ./data/log)
//! - `MESHLOG_MAX_STORE_BYTES` / `MESHLOG_MAX_INDEX_BYTES`: per-segment
//!   caps in bytes (default: 1024 each)
//! - `MESHLOG_PEERS`: comma-separated `name=host:port` pairs to replicate
//!   from (default: none)
//!
//! ## Logging
//!
//! Controlled via `RUST_LOG`:
//! ```bash
//! RUST_LOG=debug cargo run -p meshlog-server
//! ```

use std::sync::Arc;

use meshlog_cluster::Replicator;
use meshlog_proto::log::log_client::LogClient;
use meshlog_proto::log::log_server::LogServer;
use meshlog_server::LogService;
use meshlog_storage::{Config, Log};
use tonic::transport::{Endpoint, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind_addr: std::net::SocketAddr = env_or("MESHLOG_ADDR", "0.0.0.0:8400").parse()?;
    let advertise_addr = env_or("MESHLOG_ADVERTISE_ADDR", "127.0.0.1:8400");
    let data_dir = env_or("MESHLOG_DATA_DIR", "./data/log");

    let config = Config {
        max_store_bytes: env_or("MESHLOG_MAX_STORE_BYTES", "0").parse()?,
        max_index_bytes: env_or("MESHLOG_MAX_INDEX_BYTES", "0").parse()?,
        initial_offset: 0,
    };

    tracing::info!(dir = %data_dir, "opening log");
    let log = Arc::new(Log::new(&data_dir, config)?);
    let service = LogService::new(log.clone());

    // The replicator produces into this node through its own gRPC surface,
    // so replicated records take the same path as client writes. The
    // channel is lazy: it only dials once the first peer record arrives,
    // by which point the server below is up.
    let local = LogClient::new(
        Endpoint::from_shared(format!("http://{advertise_addr}"))?.connect_lazy(),
    );
    let replicator = Arc::new(Replicator::new(local));

    for pair in env_or("MESHLOG_PEERS", "").split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once('=') {
            Some((name, addr)) => replicator.join(name, addr),
            None => tracing::warn!(peer = %pair, "ignoring malformed peer (want name=addr)"),
        }
    }

    // Shut down cleanly on SIGINT/SIGTERM: stop replication first so no
    // more records arrive, then close the log so the index files seal.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown_replicator = replicator.clone();
    let shutdown_log = log.clone();
    tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        }

        shutdown_replicator.close();
        if let Err(err) = shutdown_log.close() {
            tracing::error!(error = %err, "error closing log");
        }
        let _ = shutdown_tx.send(());
    });

    tracing::info!(addr = %bind_addr, "meshlog server starting");
    Server::builder()
        .add_service(LogServer::new(service))
        .serve_with_shutdown(bind_addr, async {
            shutdown_rx.await.ok();
        })
        .await?;

    tracing::info!("meshlog server shut down");
    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
