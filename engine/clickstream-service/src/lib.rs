//! Clickstream Ingestion Service Library
//!
//! Configuration loading, component wiring, logging setup and graceful
//! shutdown for the clickstream ingestion service.

use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod logging;
pub mod service;
pub mod signals;

pub use config::ServiceConfig;
pub use logging::initialize_logging;
pub use service::ServiceState;
pub use signals::{graceful_shutdown, setup_signal_handlers};

/// Load configuration from an optional file and environment variables
pub fn load_configuration(path: Option<&Path>) -> Result<ServiceConfig> {
    config::load_config(path).context("Failed to load service configuration")
}
