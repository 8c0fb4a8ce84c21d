//! # Ingestion Coordinator
//!
//! Runs one ingestion request end to end: admission, per-event validation
//! and enrichment, one synchronous primary insert per non-empty kind, then
//! best-effort dispatch to the optional secondary sinks.
//!
//! Kinds are committed one at a time in [`EventKind::ALL`] order. A primary
//! failure fails the whole request but leaves kinds committed earlier in the
//! same request in place; there is no cross-kind rollback.

use crate::config::MAX_EVENTS_PER_REQUEST;
use crate::enrichment::{Enrich, EventEnricher, RequestContext};
use crate::error::{PipelineError, Result};
use crate::events::{EventBatch, EventKind, IngestRequest, InboundEvent};
use crate::rate_limiter::RateLimiter;
use crate::sinks::{ObjectStoreExporter, PrimaryStore, WarehouseReplicator};
use crate::validation::{Validate, ValidationError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of an accepted request. Errors list the events that were skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub errors: Vec<ValidationError>,
}

/// Store health as seen by the coordinator. `None` means the sink is not configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub primary: bool,
    pub warehouse: Option<bool>,
    pub export_enabled: bool,
}

pub struct IngestionCoordinator {
    primary: Arc<dyn PrimaryStore>,
    warehouse: Option<WarehouseReplicator>,
    exporter: Option<ObjectStoreExporter>,
    rate_limiter: Arc<RateLimiter>,
    enricher: EventEnricher,
}

impl std::fmt::Debug for IngestionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionCoordinator")
            .field("warehouse", &self.warehouse)
            .field("exporter", &self.exporter)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl IngestionCoordinator {
    /// Create a coordinator with only the primary store wired
    pub fn new(primary: Arc<dyn PrimaryStore>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            primary,
            warehouse: None,
            exporter: None,
            rate_limiter,
            enricher: EventEnricher::default(),
        }
    }

    pub fn with_warehouse(mut self, warehouse: WarehouseReplicator) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn with_exporter(mut self, exporter: ObjectStoreExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_enricher(mut self, enricher: EventEnricher) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn primary(&self) -> &Arc<dyn PrimaryStore> {
        &self.primary
    }

    pub fn warehouse(&self) -> Option<&WarehouseReplicator> {
        self.warehouse.as_ref()
    }

    pub fn exporter(&self) -> Option<&ObjectStoreExporter> {
        self.exporter.as_ref()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Ingest one request
    pub async fn ingest(&self, request: IngestRequest, ctx: &RequestContext) -> Result<IngestReport> {
        let client = ctx.client_ip();
        if !self.rate_limiter.is_allowed(&client) {
            warn!("Rate limit exceeded for client {}", client);
            return Err(PipelineError::RateLimited { client });
        }

        let total = request.total_event_count();
        if total == 0 {
            return Err(PipelineError::EmptyBatch);
        }
        if total > MAX_EVENTS_PER_REQUEST {
            warn!("Rejecting request with {} events from {}", total, client);
            return Err(PipelineError::BatchTooLarge { count: total, max: MAX_EVENTS_PER_REQUEST });
        }

        let IngestRequest { page_views, clicks, scrolls, sessions } = request;
        let mut errors = Vec::new();
        let mut processed = 0;

        processed += self.process_kind(page_views, ctx, &mut errors).await?;
        processed += self.process_kind(clicks, ctx, &mut errors).await?;
        processed += self.process_kind(scrolls, ctx, &mut errors).await?;
        processed += self.process_kind(sessions, ctx, &mut errors).await?;

        if processed == 0 {
            warn!("No valid events in request from {} ({} rejected)", client, errors.len());
            return Err(PipelineError::NoValidEvents { errors });
        }

        debug!("Processed {} of {} events from {}", processed, total, client);
        Ok(IngestReport { processed, errors })
    }

    async fn process_kind<T>(
        &self,
        events: Option<Vec<T>>,
        ctx: &RequestContext,
        errors: &mut Vec<ValidationError>,
    ) -> Result<usize>
    where
        T: Validate + Enrich,
    {
        let Some(events) = events else {
            return Ok(0);
        };

        let mut enriched = Vec::with_capacity(events.len());
        for (index, event) in events.into_iter().enumerate() {
            match event.validate() {
                Ok(()) => enriched.push(self.enricher.enrich(event, ctx)),
                Err(message) => {
                    warn!("Invalid {} event at index {}: {}", T::KIND, index, message);
                    errors.push(ValidationError { index, kind: T::KIND, message });
                }
            }
        }

        if enriched.is_empty() {
            return Ok(0);
        }

        let batch = T::into_batch(enriched);
        self.primary.insert(&batch).await.map_err(|source| {
            error!("Primary store insert of {} events failed: {}", T::KIND, source);
            PipelineError::PrimaryStore { kind: T::KIND, source }
        })?;

        let count = batch.len();
        info!("Committed {} {} events", count, T::KIND);
        self.dispatch_secondary(batch);
        Ok(count)
    }

    /// Hand a committed batch to the secondary sinks without waiting on them
    fn dispatch_secondary(&self, batch: EventBatch) {
        let kind: EventKind = batch.kind();
        let batch = Arc::new(batch);

        if let Some(exporter) = &self.exporter {
            match batch.rows() {
                Ok(rows) => {
                    exporter.export_async(rows, kind.table_name());
                }
                Err(e) => error!("Failed to convert {} events for export: {}", kind, e),
            }
        }

        if let Some(warehouse) = &self.warehouse {
            warehouse.insert_async(batch);
        }
    }

    /// Check every configured store
    pub async fn health(&self) -> HealthReport {
        let primary = self.primary.is_healthy().await;
        let warehouse = match &self.warehouse {
            Some(replicator) => Some(replicator.store().is_healthy().await),
            None => None,
        };

        HealthReport {
            healthy: primary && warehouse.unwrap_or(true),
            primary,
            warehouse,
            export_enabled: self.exporter.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::error::StoreError;
    use crate::events::{RawBase, RawClick, RawPageView};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        inserted: Mutex<Vec<(EventKind, usize)>>,
    }

    #[async_trait]
    impl PrimaryStore for RecordingStore {
        async fn insert(&self, batch: &EventBatch) -> std::result::Result<(), StoreError> {
            self.inserted.lock().push((batch.kind(), batch.len()));
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            true
        }

        async fn current_target(&self) -> String {
            "test".to_string()
        }
    }

    fn coordinator(store: Arc<RecordingStore>, max_requests: u32) -> IngestionCoordinator {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 60,
            idle_ttl_secs: 60,
        });
        IngestionCoordinator::new(store, Arc::new(limiter))
    }

    fn page_view(session_id: &str) -> RawPageView {
        RawPageView {
            base: RawBase {
                session_id: Some(session_id.to_string()),
                page_url: Some("/".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let store = Arc::new(RecordingStore::default());
        let err = coordinator(store.clone(), 10)
            .ingest(IngestRequest::default(), &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
        assert!(store.inserted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_one_insert_per_kind() {
        let store = Arc::new(RecordingStore::default());
        let request = IngestRequest {
            page_views: Some(vec![page_view("a"), page_view("b"), page_view("c")]),
            clicks: Some(vec![RawClick { base: page_view("d").base, ..Default::default() }]),
            ..Default::default()
        };

        let report = coordinator(store.clone(), 10)
            .ingest(request, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(report.processed, 4);
        assert!(report.errors.is_empty());
        assert_eq!(
            *store.inserted.lock(),
            vec![(EventKind::PageView, 3), (EventKind::Click, 1)]
        );
    }

    #[tokio::test]
    async fn test_all_invalid_returns_errors() {
        let store = Arc::new(RecordingStore::default());
        let request = IngestRequest {
            page_views: Some(vec![RawPageView::default(), page_view("")]),
            ..Default::default()
        };

        let err = coordinator(store.clone(), 10)
            .ingest(request, &RequestContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No valid events to process");
        let indexes: Vec<usize> = err.validation_errors().iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert!(store.inserted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_checked_first() {
        let store = Arc::new(RecordingStore::default());
        let coordinator = coordinator(store, 1);
        let ctx = RequestContext {
            forwarded_for: Some("203.0.113.9".to_string()),
            ..Default::default()
        };

        let err = coordinator.ingest(IngestRequest::default(), &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));

        let err = coordinator.ingest(IngestRequest::default(), &ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::RateLimited { ref client } if client == "203.0.113.9"));
    }

    #[tokio::test]
    async fn test_health_without_secondary_sinks() {
        let store = Arc::new(RecordingStore::default());
        let health = coordinator(store, 10).health().await;
        assert_eq!(
            health,
            HealthReport { healthy: true, primary: true, warehouse: None, export_enabled: false }
        );
    }
}
