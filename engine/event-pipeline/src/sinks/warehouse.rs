//! Secondary warehouse replica (Redshift over the Postgres wire protocol)
//!
//! Replication is best-effort. Rows are written in sub-batches of
//! `batch_size`, each in its own transaction, so a failure part way through
//! leaves earlier sub-batches committed and drops only the remainder.

use crate::config::WarehouseConfig;
use crate::error::StoreError;
use crate::events::{EventBatch, EventKind, EventRow};
use crate::worker_pool::BackgroundPool;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// A warehouse that can commit one sub-batch atomically
#[async_trait]
pub trait WarehouseStore: Send + Sync {
    /// Insert and commit a single sub-batch
    async fn insert_chunk(&self, kind: EventKind, rows: &[EventRow]) -> Result<(), StoreError>;

    async fn is_healthy(&self) -> bool;

    async fn current_target(&self) -> String;
}

/// Write `rows` in committed sub-batches. Returns the number of rows committed.
pub async fn insert_in_chunks(
    store: &dyn WarehouseStore,
    kind: EventKind,
    rows: &[EventRow],
    batch_size: usize,
) -> Result<usize, StoreError> {
    let mut committed = 0;
    for (chunk, rows) in rows.chunks(batch_size.max(1)).enumerate() {
        match store.insert_chunk(kind, rows).await {
            Ok(()) => {
                committed += rows.len();
                debug!("Committed {} sub-batch {} ({} rows)", kind, chunk, rows.len());
            }
            Err(e) if committed == 0 => return Err(e),
            Err(e) => {
                return Err(StoreError::PartialCommit { chunk, committed, message: e.to_string() })
            }
        }
    }
    Ok(committed)
}

/// Redshift writer backed by a lazily connected sqlx pool
#[derive(Debug, Clone)]
pub struct RedshiftStore {
    pool: PgPool,
    schema: String,
}

impl RedshiftStore {
    /// Build the pool without connecting; the first query opens a connection
    pub fn connect_lazy(config: &WarehouseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::config("warehouse url is not set"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_lazy(url)?;

        Ok(Self { pool, schema: config.schema.clone() })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: &Value) {
    match value {
        Value::Null => builder.push_bind(None::<String>),
        Value::Bool(b) => builder.push_bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => builder.push_bind(i),
            None => builder.push_bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => builder.push_bind(s.clone()),
        other => builder.push_bind(other.to_string()),
    };
}

/// Build a multi-row insert for one sub-batch. Columns come from the first row.
pub(crate) fn build_insert(
    schema: &str,
    table: &str,
    rows: &[EventRow],
) -> QueryBuilder<'static, Postgres> {
    let columns: Vec<&String> = rows.first().map(|row| row.keys().collect()).unwrap_or_default();
    let quoted: Vec<String> = columns.iter().map(|c| format!("\"{c}\"")).collect();

    let mut builder =
        QueryBuilder::new(format!("INSERT INTO {schema}.{table} ({}) VALUES ", quoted.join(", ")));

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push("(");
        for (j, column) in columns.iter().enumerate() {
            if j > 0 {
                builder.push(", ");
            }
            let value = row.get(column.as_str()).unwrap_or(&Value::Null);
            if column.as_str() == "timestamp" {
                builder.push("CAST(");
                push_value(&mut builder, value);
                builder.push(" AS TIMESTAMP)");
            } else {
                push_value(&mut builder, value);
            }
        }
        builder.push(")");
    }
    builder
}

#[async_trait]
impl WarehouseStore for RedshiftStore {
    async fn insert_chunk(&self, kind: EventKind, rows: &[EventRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut builder = build_insert(&self.schema, kind.table_name(), rows);
        let mut tx = self.pool.begin().await?;
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            Ok(value) => value == 1,
            Err(e) => {
                error!("Warehouse health check failed: {}", e);
                false
            }
        }
    }

    async fn current_target(&self) -> String {
        match sqlx::query_scalar::<_, String>("SELECT CAST(current_database() AS VARCHAR)")
            .fetch_one(&self.pool)
            .await
        {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => "unknown".to_string(),
            Err(e) => {
                error!("Failed to read warehouse database: {}", e);
                "error".to_string()
            }
        }
    }
}

/// Dispatches warehouse replication onto the background pool
#[derive(Clone)]
pub struct WarehouseReplicator {
    store: Arc<dyn WarehouseStore>,
    pool: BackgroundPool,
    batch_size: usize,
    async_enabled: bool,
}

impl std::fmt::Debug for WarehouseReplicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseReplicator")
            .field("batch_size", &self.batch_size)
            .field("async_enabled", &self.async_enabled)
            .finish()
    }
}

impl WarehouseReplicator {
    pub fn new(store: Arc<dyn WarehouseStore>, pool: BackgroundPool, config: &WarehouseConfig) -> Self {
        Self {
            store,
            pool,
            batch_size: config.batch_size.max(1),
            async_enabled: config.async_enabled,
        }
    }

    pub fn store(&self) -> &Arc<dyn WarehouseStore> {
        &self.store
    }

    /// Schedule replication and return immediately. `false` means the job was not queued.
    pub fn insert_async(&self, batch: Arc<EventBatch>) -> bool {
        if !self.async_enabled {
            debug!("Warehouse replication disabled, skipping {} batch", batch.kind());
            return false;
        }

        let store = self.store.clone();
        let batch_size = self.batch_size;
        self.pool.submit("warehouse", async move {
            let _ = replicate(store.as_ref(), &batch, batch_size).await;
        })
    }

    /// Replicate in the caller's task
    pub async fn replicate(&self, batch: &EventBatch) -> Result<usize, StoreError> {
        replicate(self.store.as_ref(), batch, self.batch_size).await
    }
}

async fn replicate(
    store: &dyn WarehouseStore,
    batch: &EventBatch,
    batch_size: usize,
) -> Result<usize, StoreError> {
    let kind = batch.kind();
    let result = match batch.rows() {
        Ok(rows) => insert_in_chunks(store, kind, &rows, batch_size).await,
        Err(e) => Err(e.into()),
    };

    match &result {
        Ok(committed) => info!("Replicated {} {} events to warehouse", committed, kind),
        Err(e) => error!("Warehouse replication of {} events failed: {}", kind, e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Commits chunks until `fail_on` is reached
    struct FlakyWarehouse {
        fail_on: Option<usize>,
        committed: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl WarehouseStore for FlakyWarehouse {
        async fn insert_chunk(&self, _kind: EventKind, rows: &[EventRow]) -> Result<(), StoreError> {
            let mut committed = self.committed.lock();
            if self.fail_on == Some(committed.len()) {
                return Err(StoreError::Rejected { status: 500, body: "disk full".to_string() });
            }
            committed.push(rows.len());
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            true
        }

        async fn current_target(&self) -> String {
            "dev".to_string()
        }
    }

    fn rows(n: usize) -> Vec<EventRow> {
        (0..n)
            .map(|i| EventRow::from([("session_id".to_string(), Value::from(format!("s{i}")))]))
            .collect()
    }

    #[tokio::test]
    async fn test_chunks_commit_independently() {
        let store = FlakyWarehouse { fail_on: None, committed: Mutex::new(Vec::new()) };
        let committed = insert_in_chunks(&store, EventKind::Click, &rows(25), 10).await.unwrap();
        assert_eq!(committed, 25);
        assert_eq!(*store.committed.lock(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_earlier_chunks() {
        let store = FlakyWarehouse { fail_on: Some(2), committed: Mutex::new(Vec::new()) };
        let err = insert_in_chunks(&store, EventKind::PageView, &rows(35), 10).await.unwrap_err();

        assert!(matches!(err, StoreError::PartialCommit { chunk: 2, committed: 20, .. }));
        assert_eq!(*store.committed.lock(), vec![10, 10]);
    }

    #[tokio::test]
    async fn test_first_chunk_failure_is_returned_as_is() {
        let store = FlakyWarehouse { fail_on: Some(0), committed: Mutex::new(Vec::new()) };
        let err = insert_in_chunks(&store, EventKind::Scroll, &rows(3), 10).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 500, .. }));
    }

    #[test]
    fn test_insert_statement_shape() {
        let rows = vec![
            EventRow::from([
                ("session_id".to_string(), Value::from("s1")),
                ("timestamp".to_string(), Value::from("2024-05-01 10:00:00")),
                ("user_id".to_string(), Value::Null),
            ]),
            EventRow::from([
                ("session_id".to_string(), Value::from("s2")),
                ("timestamp".to_string(), Value::from("2024-05-01 10:00:01")),
                ("user_id".to_string(), Value::from("u2")),
            ]),
        ];

        let builder = build_insert("analytics", "click_events", &rows);
        assert_eq!(
            builder.sql(),
            "INSERT INTO analytics.click_events (\"session_id\", \"timestamp\", \"user_id\") VALUES \
             ($1, CAST($2 AS TIMESTAMP), $3), ($4, CAST($5 AS TIMESTAMP), $6)"
        );
    }
}
