//! # Event Pipeline
//!
//! Ingestion core for clickstream telemetry: page views, clicks, scrolls and
//! session lifecycle events.
//!
//! ## Architecture
//!
//! - **RateLimiter**: per-client token buckets with interval refill
//! - **Validation**: required-field checks, isolated per event
//! - **EventEnricher**: fills timestamps, user-agent derived fields and defaults
//! - **PrimaryStore**: synchronous ClickHouse insert, one statement per kind
//! - **WarehouseReplicator**: best-effort Redshift replica in committed sub-batches
//! - **ObjectStoreExporter**: best-effort CSV export to S3
//! - **IngestionCoordinator**: ties the above together per request
//!
//! Secondary sinks run on a bounded [`BackgroundPool`] and never affect the
//! caller's response.

pub mod config;
pub mod coordinator;
pub mod enrichment;
pub mod error;
pub mod events;
pub mod rate_limiter;
pub mod schema;
pub mod sinks;
pub mod user_agent;
pub mod validation;
pub mod worker_pool;

pub use config::{PipelineConfig, MAX_EVENTS_PER_REQUEST};
pub use coordinator::{HealthReport, IngestReport, IngestionCoordinator};
pub use enrichment::{EventEnricher, RequestContext};
pub use error::{DdlError, ExportError, PipelineError, Result, StoreError};
pub use events::{EventBatch, EventKind, EventRow, IngestRequest};
pub use rate_limiter::RateLimiter;
pub use validation::ValidationError;
pub use worker_pool::BackgroundPool;
