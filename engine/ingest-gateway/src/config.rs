//! Configuration for the IngestGateway

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Largest accepted request body in bytes
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080, max_body_bytes: 10 * 1024 * 1024 }
    }
}

impl ServerConfig {
    /// Resolve the bind address
    pub fn socket_addr(&self) -> Result<SocketAddr, GatewayError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("invalid bind address: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig { port: 9090, ..Default::default() };
        assert_eq!(config.socket_addr().unwrap().port(), 9090);

        let bad = ServerConfig { host: "not a host".to_string(), ..Default::default() };
        assert!(bad.socket_addr().is_err());
    }
}
