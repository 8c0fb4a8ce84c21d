//! CSV export to object storage for external BI tooling

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::events::EventRow;
use crate::worker_pool::BackgroundPool;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Anything that can persist a dataset of rows
#[async_trait]
pub trait ObjectExporter: Send + Sync {
    /// Upload `rows` as one object. Returns the object key, or `None` when there was nothing to write.
    async fn export(&self, rows: &[EventRow], dataset: &str) -> Result<Option<String>, ExportError>;

    /// Bucket or store name used in diagnostics
    fn target(&self) -> String;
}

/// Serialize rows as CSV. Headers are the sorted keys of the first row;
/// values missing from a later row are written as empty cells.
pub fn rows_to_csv(rows: &[EventRow]) -> Result<Vec<u8>, ExportError> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let headers: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&headers)?;
    for row in rows {
        writer.write_record(headers.iter().map(|header| cell(row.get(*header))))?;
    }

    writer.into_inner().map_err(|e| ExportError::Buffer(e.to_string()))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Normalize a key prefix to `a/b/` form (or empty)
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// `{prefix}{dataset}/YYYY/MM/DD/HH/{dataset}_{YYYY-MM-DD_HH-MM-SS-mmm}_{suffix}.csv`
pub fn object_key(prefix: &str, dataset: &str, now: DateTime<Utc>, suffix: &str) -> String {
    format!(
        "{}{}/{}/{}_{}_{}.csv",
        normalize_prefix(prefix),
        dataset,
        now.format("%Y/%m/%d/%H"),
        dataset,
        now.format("%Y-%m-%d_%H-%M-%S-%3f"),
        suffix
    )
}

/// CSV exporter over any `object_store` backend
#[derive(Debug, Clone)]
pub struct CsvObjectExporter {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    target: String,
}

impl CsvObjectExporter {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, target: impl Into<String>) -> Self {
        Self { store, prefix: normalize_prefix(&prefix.into()), target: target.into() }
    }

    /// Build an S3-backed exporter. Credentials come from the standard AWS environment.
    pub fn s3(config: &ExportConfig) -> Result<Self, ExportError> {
        use object_store::aws::AmazonS3Builder;

        let bucket = config.bucket.as_deref().unwrap_or_default();
        let mut builder =
            AmazonS3Builder::from_env().with_bucket_name(bucket).with_region(&config.region);
        if let Some(ref endpoint) = config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let store = builder.build()?;
        info!("S3 exporter configured for bucket {} in {}", bucket, config.region);
        Ok(Self::new(Arc::new(store), config.prefix.clone(), format!("s3://{bucket}")))
    }
}

#[async_trait]
impl ObjectExporter for CsvObjectExporter {
    async fn export(&self, rows: &[EventRow], dataset: &str) -> Result<Option<String>, ExportError> {
        if rows.is_empty() {
            debug!("No rows to export for {}", dataset);
            return Ok(None);
        }

        let now = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        let key = object_key(&self.prefix, dataset, now, &suffix[..8]);
        let path = ObjectPath::parse(&key).map_err(|e| ExportError::InvalidPath(e.to_string()))?;

        let body = rows_to_csv(rows)?;
        let byte_size = body.len();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, AttributeValue::from("text/csv"));
        for (name, value) in [
            ("data-type", dataset.to_string()),
            ("record-count", rows.len().to_string()),
            ("byte-size", byte_size.to_string()),
            ("export-timestamp", now.to_rfc3339()),
        ] {
            attributes.insert(Attribute::Metadata(Cow::Borrowed(name)), AttributeValue::from(value));
        }

        let payload = PutPayload::from(Bytes::from(body));
        let options = PutOptions { attributes, ..Default::default() };
        self.store.put_opts(&path, payload, options).await?;

        info!(
            "Exported {} {} records ({} bytes) to {}/{}",
            rows.len(),
            dataset,
            byte_size,
            self.target,
            key
        );
        Ok(Some(key))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// Dispatches exports onto the background pool
#[derive(Clone)]
pub struct ObjectStoreExporter {
    exporter: Arc<dyn ObjectExporter>,
    pool: BackgroundPool,
}

impl std::fmt::Debug for ObjectStoreExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreExporter").field("target", &self.exporter.target()).finish()
    }
}

impl ObjectStoreExporter {
    pub fn new(exporter: Arc<dyn ObjectExporter>, pool: BackgroundPool) -> Self {
        Self { exporter, pool }
    }

    pub fn target(&self) -> String {
        self.exporter.target()
    }

    /// Schedule an export and return immediately. Failures are logged, never returned.
    pub fn export_async(&self, rows: Vec<EventRow>, dataset: &str) -> bool {
        let exporter = self.exporter.clone();
        let dataset = dataset.to_string();
        self.pool.submit("export", async move {
            if let Err(e) = exporter.export(&rows, &dataset).await {
                error!("Failed to export {} {} records: {}", rows.len(), dataset, e);
            }
        })
    }
}
