//! # Configuration Management
//!
//! Configuration structures for the ingestion pipeline and its sinks.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of events accepted in a single ingestion call
pub const MAX_EVENTS_PER_REQUEST: usize = 1000;

/// Main configuration for the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Admission control configuration
    pub rate_limit: RateLimitConfig,
    /// Primary columnar store configuration
    pub primary: PrimaryStoreConfig,
    /// Secondary warehouse configuration
    pub warehouse: WarehouseConfig,
    /// Object storage export configuration
    pub export: ExportConfig,
    /// Background pool configuration
    pub background: BackgroundPoolConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client per window
    pub max_requests: u32,
    /// Refill window in seconds
    pub window_secs: u64,
    /// Idle time after which a client's bucket is dropped, in seconds.
    /// Never shorter than the window.
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_requests: 1000, window_secs: 900, idle_ttl_secs: 3600 }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs.max(self.window_secs))
    }
}

/// Primary store (ClickHouse) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryStoreConfig {
    /// HTTP endpoint of the ClickHouse server
    pub url: String,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for PrimaryStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            username: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Secondary warehouse (Redshift) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// Whether the warehouse replica is wired at all
    pub enabled: bool,
    /// Postgres-protocol connection URL
    pub url: Option<String>,
    /// Target schema for event tables
    pub schema: String,
    /// Rows per committed sub-batch
    pub batch_size: usize,
    /// Whether replication is dispatched from the ingestion path
    pub async_enabled: bool,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// DDL status poll interval in seconds
    pub ddl_poll_secs: u64,
    /// DDL overall timeout in seconds
    pub ddl_timeout_secs: u64,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            schema: "public".to_string(),
            batch_size: 1000,
            async_enabled: true,
            max_connections: 5,
            ddl_poll_secs: 5,
            ddl_timeout_secs: 300,
        }
    }
}

/// Object storage export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    pub bucket: Option<String>,
    /// Key prefix; a trailing slash is added when missing
    pub prefix: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores
    pub endpoint: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bucket: None,
            prefix: "quicksight/analytics/".to_string(),
            region: "us-east-1".to_string(),
            endpoint: None,
        }
    }
}

/// Bounded background pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundPoolConfig {
    /// Tasks allowed to run concurrently
    pub workers: usize,
    /// Tasks allowed to wait for a worker before submissions are rejected
    pub queue_depth: usize,
}

impl Default for BackgroundPoolConfig {
    fn default() -> Self {
        Self { workers: 8, queue_depth: 1024 }
    }
}

impl PipelineConfig {
    /// Check the configuration for values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit.max_requests == 0 {
            return Err("rate_limit.max_requests must be greater than zero".to_string());
        }
        if self.rate_limit.window_secs == 0 {
            return Err("rate_limit.window_secs must be greater than zero".to_string());
        }
        if self.primary.url.trim().is_empty() {
            return Err("primary.url is required".to_string());
        }
        if self.warehouse.enabled {
            if self.warehouse.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err("warehouse.url is required when the warehouse is enabled".to_string());
            }
            if self.warehouse.batch_size == 0 {
                return Err("warehouse.batch_size must be greater than zero".to_string());
            }
        }
        if self.export.enabled && self.export.bucket.as_deref().map_or(true, str::is_empty) {
            return Err("export.bucket is required when export is enabled".to_string());
        }
        if self.background.workers == 0 || self.background.queue_depth == 0 {
            return Err("background pool needs at least one worker and one queue slot".to_string());
        }
        Ok(())
    }
}
