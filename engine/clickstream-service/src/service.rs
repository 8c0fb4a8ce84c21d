//! Service state management and component initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ServiceConfig;
use event_pipeline::sinks::{
    ClickHouseStore, CsvObjectExporter, DdlExecutor, ObjectStoreExporter, RedshiftStore,
    StatementJobs, WarehouseReplicator,
};
use event_pipeline::{BackgroundPool, IngestionCoordinator, RateLimiter};
use ingest_gateway::{ApiState, IngestGateway, WarehouseAdmin};

/// Service state containing all initialized components
pub struct ServiceState {
    /// Service configuration
    pub config: ServiceConfig,

    /// Per-request ingestion coordinator
    pub coordinator: Arc<IngestionCoordinator>,

    /// Admission control shared with the coordinator
    pub rate_limiter: Arc<RateLimiter>,

    /// Bounded pool running secondary sink work
    pub background: BackgroundPool,

    /// Warehouse DDL handles, when the warehouse is enabled
    pub warehouse_admin: Option<WarehouseAdmin>,

    shutdown_tx: watch::Sender<bool>,
}

impl ServiceState {
    /// Create a new service state with all components initialized
    pub async fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing service components...");
        let pipeline = &config.pipeline;

        let rate_limiter = Arc::new(RateLimiter::new(pipeline.rate_limit.clone()));
        let background = BackgroundPool::new(&pipeline.background);

        info!("Initializing primary store at {}...", pipeline.primary.url);
        let primary = ClickHouseStore::new(pipeline.primary.clone())
            .context("Failed to create primary store client")?;
        let mut coordinator = IngestionCoordinator::new(Arc::new(primary), rate_limiter.clone());

        let mut warehouse_admin = None;
        if pipeline.warehouse.enabled {
            info!("Initializing warehouse replica (schema {})...", pipeline.warehouse.schema);
            let store = RedshiftStore::connect_lazy(&pipeline.warehouse)
                .context("Failed to create warehouse pool")?;

            let jobs = StatementJobs::new(store.pool().clone());
            warehouse_admin = Some(WarehouseAdmin {
                ddl: DdlExecutor::new(
                    Arc::new(jobs),
                    Duration::from_secs(pipeline.warehouse.ddl_poll_secs),
                    Duration::from_secs(pipeline.warehouse.ddl_timeout_secs),
                ),
                schema: pipeline.warehouse.schema.clone(),
                batch_size: pipeline.warehouse.batch_size,
                async_enabled: pipeline.warehouse.async_enabled,
            });

            coordinator = coordinator.with_warehouse(WarehouseReplicator::new(
                Arc::new(store),
                background.clone(),
                &pipeline.warehouse,
            ));
        } else {
            info!("Warehouse replica disabled");
        }

        if pipeline.export.enabled {
            info!("Initializing object storage export...");
            let exporter = CsvObjectExporter::s3(&pipeline.export)
                .context("Failed to create object storage exporter")?;
            coordinator = coordinator
                .with_exporter(ObjectStoreExporter::new(Arc::new(exporter), background.clone()));
        } else {
            info!("Object storage export disabled");
        }

        let (shutdown_tx, _) = watch::channel(false);

        info!("Service components initialized successfully");
        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
            rate_limiter,
            background,
            warehouse_admin,
            shutdown_tx,
        })
    }

    /// State shared with the HTTP handlers
    pub fn api_state(&self) -> ApiState {
        ApiState { coordinator: self.coordinator.clone(), warehouse: self.warehouse_admin.clone() }
    }

    fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown_tx.subscribe();
        async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Start the IngestGateway. It stops accepting requests on shutdown.
    pub fn start_gateway(&self) -> tokio::task::JoinHandle<()> {
        let gateway = IngestGateway::new(self.config.server.clone(), self.api_state());
        let shutdown = self.shutdown_signal();

        tokio::spawn(async move {
            if let Err(e) = gateway.serve(shutdown).await {
                error!("IngestGateway failed: {}", e);
            }
        })
    }

    /// Periodically drop idle rate-limit buckets until shutdown
    pub fn start_eviction_task(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.rate_limiter.clone();
        let period = Duration::from_secs(self.config.service.eviction_interval_secs);
        let shutdown = self.shutdown_signal();

        tokio::spawn(async move {
            tokio::pin!(shutdown);
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = interval.tick() => {
                        let evicted = limiter.evict_idle();
                        debug!(
                            "Evicted {} idle rate-limit buckets, {} tracked",
                            evicted,
                            limiter.tracked_clients()
                        );
                    }
                }
            }
        })
    }

    /// Signal the gateway and background tasks to stop
    pub fn trigger_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Wait for queued secondary sink work. Returns `false` on timeout.
    pub async fn drain_background(&self, timeout: Duration) -> bool {
        let stats = self.background.stats();
        info!(
            "Draining background pool ({} submitted, {} completed, {} rejected)",
            stats.submitted, stats.completed, stats.rejected
        );
        self.background.shutdown(timeout).await
    }
}
