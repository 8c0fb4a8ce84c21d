//! Clickstream Ingestion Service
//!
//! Main entry point. Loads configuration, wires the pipeline and its sinks,
//! serves the HTTP API and shuts down gracefully on SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use clickstream_service::{
    graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers, ServiceState,
};

#[derive(Parser)]
#[command(name = "clickstream")]
#[command(about = "Clickstream ingestion service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "CLICKSTREAM_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration before logging so the level and format apply
    let config = load_configuration(args.config.as_deref())?;
    initialize_logging(&config.logging)?;

    info!("Starting Clickstream Service v{}", env!("CARGO_PKG_VERSION"));

    // Create service state
    let service_state = Arc::new(
        ServiceState::new(config).await.context("Failed to initialize service components")?,
    );

    // Setup signal handlers for graceful shutdown
    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    let gateway_handle = service_state.start_gateway();
    let eviction_handle = service_state.start_eviction_task();

    info!("Clickstream Service is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.recv().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service_state, gateway_handle, eviction_handle).await?;

    info!("Clickstream Service shutdown complete");
    Ok(())
}
