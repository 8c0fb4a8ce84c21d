//! Service configuration management

use anyhow::{anyhow, Context, Result};
use event_pipeline::PipelineConfig;
use ingest_gateway::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Ingestion pipeline and sink configuration
    pub pipeline: PipelineConfig,

    /// Service-level configuration
    pub service: ServiceSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// How often idle rate-limit buckets are swept, in seconds
    pub eviction_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self { shutdown_timeout_secs: 30, eviction_interval_secs: 300 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Load configuration from an optional TOML file, then environment variables
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    dotenv::dotenv().ok();

    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => ServiceConfig::default(),
    };

    apply_env(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a TOML file. Missing sections fall back to defaults.
pub fn load_from_file(path: &Path) -> Result<ServiceConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| anyhow!("Invalid value for {}: {:?}", name, value))
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("Invalid value for {}: {:?}", name, value)),
    }
}

/// Override configuration from environment variables
pub fn apply_env<F>(config: &mut ServiceConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let pipeline = &mut config.pipeline;

    // Logging
    if let Some(level) = lookup("CLICKSTREAM_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = lookup("CLICKSTREAM_LOG_FORMAT") {
        config.logging.format = format;
    }

    // HTTP server
    if let Some(host) = lookup("CLICKSTREAM_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("CLICKSTREAM_PORT") {
        config.server.port = parse_var("CLICKSTREAM_PORT", &port)?;
    }

    // Primary store
    if let Some(url) = lookup("CLICKHOUSE_URL") {
        pipeline.primary.url = url;
    }
    if let Some(user) = lookup("CLICKHOUSE_USER") {
        pipeline.primary.username = user;
    }
    if let Some(password) = lookup("CLICKHOUSE_PASSWORD") {
        pipeline.primary.password = password;
    }
    if let Some(database) = lookup("CLICKHOUSE_DATABASE") {
        pipeline.primary.database = database;
    }

    // Rate limiting
    if let Some(max) = lookup("RATE_LIMIT_MAX_REQUESTS") {
        pipeline.rate_limit.max_requests = parse_var("RATE_LIMIT_MAX_REQUESTS", &max)?;
    }
    if let Some(window) = lookup("RATE_LIMIT_WINDOW_SECS") {
        pipeline.rate_limit.window_secs = parse_var("RATE_LIMIT_WINDOW_SECS", &window)?;
    }

    // Warehouse
    if let Some(enabled) = lookup("REDSHIFT_ENABLED") {
        pipeline.warehouse.enabled = parse_flag("REDSHIFT_ENABLED", &enabled)?;
    }
    if let Some(url) = lookup("REDSHIFT_URL") {
        pipeline.warehouse.url = Some(url);
    }
    if let Some(schema) = lookup("REDSHIFT_SCHEMA") {
        pipeline.warehouse.schema = schema;
    }
    if let Some(size) = lookup("REDSHIFT_BATCH_SIZE") {
        pipeline.warehouse.batch_size = parse_var("REDSHIFT_BATCH_SIZE", &size)?;
    }
    if let Some(enabled) = lookup("REDSHIFT_ASYNC_ENABLED") {
        pipeline.warehouse.async_enabled = parse_flag("REDSHIFT_ASYNC_ENABLED", &enabled)?;
    }
    if let Some(secs) = lookup("REDSHIFT_DDL_POLL_SECS") {
        pipeline.warehouse.ddl_poll_secs = parse_var("REDSHIFT_DDL_POLL_SECS", &secs)?;
    }
    if let Some(secs) = lookup("REDSHIFT_DDL_TIMEOUT_SECS") {
        pipeline.warehouse.ddl_timeout_secs = parse_var("REDSHIFT_DDL_TIMEOUT_SECS", &secs)?;
    }

    // Object storage export
    if let Some(enabled) = lookup("S3_EXPORT_ENABLED") {
        pipeline.export.enabled = parse_flag("S3_EXPORT_ENABLED", &enabled)?;
    }
    if let Some(bucket) = lookup("S3_BUCKET") {
        pipeline.export.bucket = Some(bucket);
    }
    if let Some(prefix) = lookup("S3_PREFIX") {
        pipeline.export.prefix = prefix;
    }
    if let Some(region) = lookup("AWS_REGION") {
        pipeline.export.region = region;
    }
    if let Some(endpoint) = lookup("S3_ENDPOINT") {
        pipeline.export.endpoint = Some(endpoint);
    }

    // Background pool
    if let Some(workers) = lookup("BACKGROUND_WORKERS") {
        pipeline.background.workers = parse_var("BACKGROUND_WORKERS", &workers)?;
    }
    if let Some(depth) = lookup("BACKGROUND_QUEUE_DEPTH") {
        pipeline.background.queue_depth = parse_var("BACKGROUND_QUEUE_DEPTH", &depth)?;
    }

    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &ServiceConfig) -> Result<()> {
    // Validate log level
    match config.logging.level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.logging.level)),
    }

    // Validate log format
    match config.logging.format.as_str() {
        "json" | "pretty" => {}
        _ => return Err(anyhow!("Invalid log format: {}", config.logging.format)),
    }

    if config.service.eviction_interval_secs == 0 {
        return Err(anyhow!("service.eviction_interval_secs must be greater than zero"));
    }

    config.server.socket_addr().map_err(|e| anyhow!(e.to_string()))?;
    config.pipeline.validate().map_err(|e| anyhow!("Invalid pipeline configuration: {}", e))?;

    Ok(())
}
