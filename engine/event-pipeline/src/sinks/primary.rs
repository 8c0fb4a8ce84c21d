//! Primary columnar store (ClickHouse over its HTTP interface)

use crate::config::PrimaryStoreConfig;
use crate::error::StoreError;
use crate::events::EventBatch;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// The synchronous, authoritative sink
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Insert one kind's batch as a single multi-row statement
    async fn insert(&self, batch: &EventBatch) -> Result<(), StoreError>;

    /// Trivial round trip against the store
    async fn is_healthy(&self) -> bool;

    /// Name of the database currently written to
    async fn current_target(&self) -> String;
}

/// ClickHouse writer using `FORMAT JSONEachRow`
#[derive(Debug, Clone)]
pub struct ClickHouseStore {
    client: reqwest::Client,
    config: PrimaryStoreConfig,
}

impl ClickHouseStore {
    pub fn new(config: PrimaryStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn request(&self, query: &str) -> reqwest::RequestBuilder {
        self.client
            .post(&self.config.url)
            .query(&[("query", query), ("database", self.config.database.as_str())])
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    async fn query_text(&self, query: &str) -> Result<String, StoreError> {
        let response = self.request(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Rejected { status: status.as_u16(), body });
        }
        Ok(body)
    }
}

/// Serialize rows as newline-delimited JSON objects
pub(crate) fn json_each_row(batch: &EventBatch) -> Result<String, StoreError> {
    let mut body = String::new();
    for row in batch.rows()? {
        body.push_str(&serde_json::to_string(&row)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl PrimaryStore for ClickHouseStore {
    async fn insert(&self, batch: &EventBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let table = batch.kind().table_name();
        let statement = format!(
            "INSERT INTO {}.{} FORMAT JSONEachRow",
            self.config.database, table
        );
        let body = json_each_row(batch)?;

        let response = self
            .request(&statement)
            .query(&[
                ("input_format_skip_unknown_fields", "1"),
                ("date_time_input_format", "best_effort"),
            ])
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        debug!("Inserted {} rows into {}", batch.len(), table);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        match self.query_text("SELECT 1").await {
            Ok(body) => body.trim() == "1",
            Err(e) => {
                warn!("Primary store health check failed: {}", e);
                false
            }
        }
    }

    async fn current_target(&self) -> String {
        match self.query_text("SELECT currentDatabase()").await {
            Ok(body) if !body.trim().is_empty() => body.trim().to_string(),
            Ok(_) => "unknown".to_string(),
            Err(e) => {
                warn!("Failed to read primary store database: {}", e);
                "error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Click, EventBase};

    fn click(session_id: &str) -> Click {
        Click {
            base: EventBase {
                session_id: session_id.to_string(),
                user_id: Some("u1".to_string()),
                page_url: "/pricing".to_string(),
                timestamp: "2024-05-01 10:00:00".to_string(),
                user_agent: String::new(),
                ip_address: "10.0.0.1".to_string(),
                browser: "Unknown".to_string(),
                os: "Unknown".to_string(),
                device_type: "Unknown".to_string(),
                country: "Unknown".to_string(),
                city: "Unknown".to_string(),
                referrer: String::new(),
            },
            element_id: "buy".to_string(),
            element_text: "Buy now".to_string(),
            click_x: 10,
            click_y: 20,
        }
    }

    #[test]
    fn test_json_each_row_body() {
        let batch = EventBatch::Clicks(vec![click("s1"), click("s2")]);
        let body = json_each_row(&batch).unwrap();

        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["session_id"], "s1");
        assert_eq!(first["element_text"], "Buy now");
        assert_eq!(first["click_y"], 20);
    }

    #[tokio::test]
    async fn test_unreachable_store_reports_unhealthy() {
        let store = ClickHouseStore::new(PrimaryStoreConfig {
            url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

        assert!(!store.is_healthy().await);
        assert_eq!(store.current_target().await, "error");
        assert!(store.insert(&EventBatch::Clicks(vec![click("s1")])).await.is_err());
    }
}
