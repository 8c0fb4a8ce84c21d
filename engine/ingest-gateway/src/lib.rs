//! IngestGateway - REST API for clickstream ingestion
//!
//! Accepts event batches over HTTP, reports store health and exposes the
//! warehouse administration endpoints used for table bootstrap.

pub mod config;
pub mod error;
pub mod gateway;
pub mod rest_api;

pub use config::ServerConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::IngestGateway;
pub use rest_api::{create_routes, ApiState, WarehouseAdmin};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;
