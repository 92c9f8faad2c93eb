//! Tactix gateway binary entry point.
//!
//! Reads configuration from the environment (or a TOML file), wires the
//! verifier, role mapper, permission engine and realtime distributor, and
//! serves until ctrl-c.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tactix_gateway::GatewayConfig;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tactix-gateway", about = "Tactix authenticating edge")]
struct Args {
    /// TOML config file. Without it, configuration comes from the environment.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Listen address, overriding the configured one.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing from RUST_LOG (default: info).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            let config = GatewayConfig::load(path)?;
            tracing::info!("loaded configuration from {}", path.display());
            config
        }
        None => GatewayConfig::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let handle = tactix_gateway::serve(&config).await?;
    shutdown_signal().await;
    handle.shutdown().await?;

    tracing::info!("gateway shut down");
    Ok(())
}

/// Wait for ctrl-c signal for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {e}");
        return;
    }
    tracing::info!("received shutdown signal");
}
