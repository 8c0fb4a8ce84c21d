//! Main IngestGateway implementation

use crate::config::ServerConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::rest_api::{create_routes, ApiState};

use std::future::Future;
use tracing::info;

/// HTTP front of the ingestion pipeline
pub struct IngestGateway {
    config: ServerConfig,
    state: ApiState,
}

impl IngestGateway {
    pub fn new(config: ServerConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests
    pub async fn serve<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.socket_addr()?;
        let routes = create_routes(self.state, self.config.max_body_bytes);

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| GatewayError::Server(format!("Failed to bind {addr}: {e}")))?;

        info!("IngestGateway listening on {}", bound);
        server.await;
        info!("IngestGateway stopped accepting requests");

        Ok(())
    }
}
