//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

/// Setup signal handlers. The receiver yields once for the first SIGINT or SIGTERM.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(2);

    // Handle Ctrl+C (SIGINT)
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = ctrl_c_tx.send(()).await;
    });

    // Handle SIGTERM (Unix only)
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, shutdown_flag.clone())?;

        tokio::spawn(async move {
            loop {
                if shutdown_flag.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send(()).await;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Graceful shutdown handler
pub async fn graceful_shutdown(
    service_state: Arc<ServiceState>,
    gateway_handle: tokio::task::JoinHandle<()>,
    eviction_handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    info!("Starting graceful shutdown...");

    // Stop accepting requests and stop the sweeper
    service_state.trigger_shutdown();

    let shutdown_timeout = Duration::from_secs(service_state.config.service.shutdown_timeout_secs);

    // Wait for in-flight requests to finish
    match timeout(shutdown_timeout, gateway_handle).await {
        Ok(Ok(())) => {
            info!("IngestGateway stopped gracefully");
        }
        Ok(Err(e)) => {
            error!("IngestGateway task failed: {}", e);
        }
        Err(_) => {
            warn!("IngestGateway did not stop within timeout, forcing shutdown");
        }
    }

    if let Err(e) = eviction_handle.await {
        error!("Rate limiter sweeper task failed: {}", e);
    }

    // Drain secondary sink work queued by the last requests
    if !service_state.drain_background(shutdown_timeout).await {
        warn!("Some background sink jobs were abandoned at shutdown");
    }

    info!("Graceful shutdown complete");
    Ok(())
}
