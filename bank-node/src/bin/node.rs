//! Bank node binary

use anyhow::Context;
use bank_node::{Config, Server};
use ledger_core::{Ledger, LedgerObserver};
use std::sync::Arc;

/// Logs every ledger change
struct LogObserver;

impl LedgerObserver for LogObserver {
    fn update(&self, total_funds: u64, client_count: usize) {
        tracing::info!(total_funds, client_count, "Ledger updated");
    }

    fn online_changed(&self, online: bool) {
        tracing::info!(online, "Node status changed");
    }
}

fn load_config() -> anyhow::Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BANK_NODE_CONFIG").ok());

    let config = match path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?
            .with_env_overrides()?,
        None => Config::from_env()?,
    };

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config()?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        address = %config.address,
        port = config.port,
        "Starting bank node"
    );

    // Open ledger
    let ledger = Ledger::open(config.ledger.clone()).context("failed to open ledger")?;
    let _observer = ledger.attach(Arc::new(LogObserver));

    let server = Server::new(config, ledger.clone())?;
    server.start().await.context("failed to start server")?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down bank node");

    server.stop().await;

    if ledger.is_memory_only() {
        tracing::warn!("Last snapshot save failed, recent changes may not be on disk");
    }

    match server.metrics().export() {
        Ok(text) => tracing::debug!(metrics = %text, "Node metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to export node metrics"),
    }
    match ledger.metrics().export() {
        Ok(text) => tracing::debug!(metrics = %text, "Ledger metrics"),
        Err(e) => tracing::warn!(error = %e, "Failed to export ledger metrics"),
    }

    ledger.shutdown().await?;
    Ok(())
}
