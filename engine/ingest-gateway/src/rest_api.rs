//! REST API endpoints for the IngestGateway
//!
//! Event ingestion, store health and the warehouse administration endpoints
//! used for table bootstrap.

use crate::error::GatewayError;
use bytes::Bytes;
use event_pipeline::schema::create_table_statements;
use event_pipeline::sinks::{validate_ddl, DdlExecutor};
use event_pipeline::{
    EventKind, IngestReport, IngestRequest, IngestionCoordinator, RequestContext, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::Filter;

/// Warehouse administration handles. Absent when the warehouse is disabled.
#[derive(Clone)]
pub struct WarehouseAdmin {
    pub ddl: DdlExecutor,
    pub schema: String,
    pub batch_size: usize,
    pub async_enabled: bool,
}

/// Shared state injected into every handler
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub warehouse: Option<WarehouseAdmin>,
}

/// Ingestion response body
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub processed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        Self { success: true, processed: report.processed, errors: report.errors, error: None }
    }
}

/// DDL request body
#[derive(Debug, Deserialize)]
pub struct DdlRequest {
    pub sql: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    pub timestamp: String,
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        let code = match err {
            GatewayError::Pipeline(_) => "INGESTION_FAILED",
            GatewayError::Ddl(event_pipeline::DdlError::NotAllowed) => "DDL_NOT_ALLOWED",
            GatewayError::Ddl(event_pipeline::DdlError::EmptyStatement) => "SQL_REQUIRED",
            GatewayError::Ddl(_) => "DDL_FAILED",
            GatewayError::InvalidBody(_) => "INVALID_REQUEST",
            GatewayError::WarehouseDisabled => "WAREHOUSE_DISABLED",
            GatewayError::Config(_) => "CONFIGURATION_ERROR",
            GatewayError::Server(_) => "SERVER_ERROR",
        };
        Self {
            success: false,
            error: err.to_string(),
            code,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> WithStatus<Json> {
    warp::reply::with_status(warp::reply::json(body), status)
}

fn error_reply(err: &GatewayError) -> WithStatus<Json> {
    json_reply(err.status_code(), &ErrorResponse::from(err))
}

fn health_word(healthy: bool) -> &'static str {
    if healthy {
        "healthy"
    } else {
        "unhealthy"
    }
}

/// Ingest a batch of events
pub async fn ingest_events(
    body: Bytes,
    ctx: RequestContext,
    state: ApiState,
) -> Result<WithStatus<Json>, warp::Rejection> {
    let request: IngestRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Malformed ingestion body: {}", e);
            let err = GatewayError::InvalidBody(e.to_string());
            let response = IngestResponse {
                success: false,
                processed: 0,
                errors: Vec::new(),
                error: Some(err.to_string()),
            };
            return Ok(json_reply(err.status_code(), &response));
        }
    };

    match state.coordinator.ingest(request, &ctx).await {
        Ok(report) => Ok(json_reply(StatusCode::OK, &IngestResponse::from(report))),
        Err(e) => {
            let errors = e.validation_errors().to_vec();
            let err = GatewayError::from(e);
            let response = IngestResponse {
                success: false,
                processed: 0,
                errors,
                error: Some(err.to_string()),
            };
            Ok(json_reply(err.status_code(), &response))
        }
    }
}

/// Overall and per-store health
pub async fn health(state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let report = state.coordinator.health().await;

    let redshift = match report.warehouse {
        Some(healthy) => serde_json::Value::from(healthy),
        None => serde_json::Value::from("disabled"),
    };
    let body = serde_json::json!({
        "status": if report.healthy { "UP" } else { "DOWN" },
        "healthy": report.healthy,
        "clickhouse": report.primary,
        "redshift": redshift,
        "s3_export": if report.export_enabled { "enabled" } else { "disabled" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let status = if report.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok(json_reply(status, &body))
}

/// Primary store database and health
pub async fn database_info(state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let primary = state.coordinator.primary();
    let body = serde_json::json!({
        "database": primary.current_target().await,
        "healthy": primary.is_healthy().await,
        "tables": EventKind::ALL.iter().map(EventKind::table_name).collect::<Vec<_>>(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(json_reply(StatusCode::OK, &body))
}

/// Warehouse health
pub async fn warehouse_health(state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let Some(replicator) = state.coordinator.warehouse() else {
        let body = serde_json::json!({
            "status": "disabled",
            "service": "redshift",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        return Ok(json_reply(StatusCode::SERVICE_UNAVAILABLE, &body));
    };

    let store = replicator.store();
    let healthy = store.is_healthy().await;
    let body = serde_json::json!({
        "status": health_word(healthy),
        "database": store.current_target().await,
        "service": "redshift",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    Ok(json_reply(status, &body))
}

/// Warehouse connection info and feature flags
pub async fn warehouse_info(state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let (Some(replicator), Some(admin)) = (state.coordinator.warehouse(), state.warehouse.as_ref())
    else {
        return Ok(error_reply(&GatewayError::WarehouseDisabled));
    };

    let store = replicator.store();
    let body = serde_json::json!({
        "database": store.current_target().await,
        "healthy": store.is_healthy().await,
        "schema": admin.schema,
        "service": "redshift",
        "features": {
            "async_insert": admin.async_enabled,
            "batch_processing": true,
            "batch_size": admin.batch_size,
            "ddl_polling": true,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(json_reply(StatusCode::OK, &body))
}

/// Run one allow-listed DDL statement and wait for it
pub async fn execute_ddl(body: Bytes, state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let request: DdlRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return Ok(error_reply(&GatewayError::InvalidBody(e.to_string()))),
    };

    let sql = request.sql.unwrap_or_default();
    if let Err(e) = validate_ddl(&sql) {
        tracing::warn!("Rejected DDL statement: {}", e);
        return Ok(error_reply(&e.into()));
    }

    let Some(admin) = state.warehouse else {
        return Ok(error_reply(&GatewayError::WarehouseDisabled));
    };

    match admin.ddl.execute(&sql).await {
        Ok(statement_id) => Ok(json_reply(
            StatusCode::OK,
            &serde_json::json!({
                "status": "success",
                "statement_id": statement_id,
                "message": "DDL statement executed successfully",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        )),
        Err(e) => {
            tracing::error!("DDL statement failed: {}", e);
            Ok(error_reply(&e.into()))
        }
    }
}

/// Create the four event tables in the warehouse
pub async fn init_tables(state: ApiState) -> Result<WithStatus<Json>, warp::Rejection> {
    let Some(admin) = state.warehouse else {
        return Ok(error_reply(&GatewayError::WarehouseDisabled));
    };

    match admin.ddl.execute_all(create_table_statements(&admin.schema)).await {
        Ok(statement_ids) => {
            tracing::info!("Warehouse tables initialized in schema {}", admin.schema);
            Ok(json_reply(
                StatusCode::OK,
                &serde_json::json!({
                    "status": "success",
                    "message": "Redshift tables initialized successfully",
                    "tables": EventKind::ALL.iter().map(EventKind::table_name).collect::<Vec<_>>(),
                    "statement_ids": statement_ids,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            ))
        }
        Err(e) => {
            tracing::error!("Failed to initialize warehouse tables: {}", e);
            Ok(error_reply(&e.into()))
        }
    }
}

fn with_state(state: ApiState) -> impl Filter<Extract = (ApiState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Extract the request metadata the pipeline needs
pub fn request_context() -> impl Filter<Extract = (RequestContext,), Error = warp::Rejection> + Clone
{
    warp::header::optional::<String>("user-agent")
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::header::optional::<String>("x-real-ip"))
        .and(warp::addr::remote())
        .map(
            |user_agent, forwarded_for, real_ip, remote: Option<SocketAddr>| RequestContext {
                user_agent,
                forwarded_for,
                real_ip,
                remote_addr: remote.map(|addr| addr.ip()),
            },
        )
}

/// Create all REST API routes
pub fn create_routes(
    state: ApiState,
    max_body_bytes: u64,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    // Event ingestion endpoint
    let ingest = warp::path!("analytics" / "events")
        .and(warp::post())
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::bytes())
        .and(request_context())
        .and(with_state(state.clone()))
        .and_then(ingest_events);

    // Primary store info endpoint
    let db_info = warp::path!("analytics" / "database-info")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(database_info);

    // Health check endpoint
    let health_check = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    // Warehouse endpoints
    let redshift_health = warp::path!("redshift" / "health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(warehouse_health);

    let redshift_info = warp::path!("redshift" / "info")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(warehouse_info);

    let redshift_ddl = warp::path!("redshift" / "ddl")
        .and(warp::post())
        .and(warp::body::content_length_limit(64 * 1024))
        .and(warp::body::bytes())
        .and(with_state(state.clone()))
        .and_then(execute_ddl);

    let redshift_init = warp::path!("redshift" / "init-tables")
        .and(warp::post())
        .and(with_state(state))
        .and_then(init_tables);

    // Combine all routes
    ingest
        .or(db_info)
        .or(health_check)
        .or(redshift_health)
        .or(redshift_info)
        .or(redshift_ddl)
        .or(redshift_init)
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type", "user-agent", "x-forwarded-for"])
                .allow_methods(vec!["GET", "POST", "OPTIONS"]),
        )
        .with(warp::trace::request())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use event_pipeline::config::RateLimitConfig;
    use event_pipeline::sinks::{JobStatus, PrimaryStore, StatementApi};
    use event_pipeline::{DdlError, EventBatch, RateLimiter, StoreError};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryStore {
        inserted: Mutex<Vec<(EventKind, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl PrimaryStore for MemoryStore {
        async fn insert(&self, batch: &EventBatch) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Rejected { status: 503, body: "down".to_string() });
            }
            self.inserted.lock().push((batch.kind(), batch.len()));
            Ok(())
        }

        async fn is_healthy(&self) -> bool {
            !self.fail
        }

        async fn current_target(&self) -> String {
            "analytics".to_string()
        }
    }

    struct InstantStatements {
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StatementApi for InstantStatements {
        async fn submit(&self, sql: &str) -> Result<String, DdlError> {
            let mut submitted = self.submitted.lock();
            submitted.push(sql.to_string());
            Ok(format!("stmt-{}", submitted.len()))
        }

        async fn describe(&self, _id: &str) -> Result<JobStatus, DdlError> {
            Ok(JobStatus::Finished)
        }
    }

    fn state(store: Arc<MemoryStore>, max_requests: u32) -> ApiState {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests,
            window_secs: 900,
            idle_ttl_secs: 900,
        });
        ApiState {
            coordinator: Arc::new(IngestionCoordinator::new(store, Arc::new(limiter))),
            warehouse: None,
        }
    }

    fn body_json(response: &warp::http::Response<Bytes>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_partial_success() {
        let store = Arc::new(MemoryStore::default());
        let routes = create_routes(state(store.clone(), 100), 1024 * 1024);

        let response = warp::test::request()
            .method("POST")
            .path("/analytics/events")
            .header("x-forwarded-for", "203.0.113.10")
            .json(&serde_json::json!({
                "page_views": [
                    {"session_id": "s1", "page_url": "/"},
                    {"session_id": "s1", "page_url": "/pricing"}
                ],
                "clicks": [{"page_url": "/pricing", "element_id": "buy"}]
            }))
            .reply(&routes)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["success"], true);
        assert_eq!(body["processed"], 2);
        assert_eq!(body["errors"][0]["index"], 0);
        assert_eq!(body["errors"][0]["error"], "Missing required fields: session_id");
        assert!(body.get("error").is_none());
        assert_eq!(*store.inserted.lock(), vec![(EventKind::PageView, 2)]);
    }

    #[tokio::test]
    async fn test_ingest_rejections() {
        let routes = create_routes(state(Arc::new(MemoryStore::default()), 100), 1024 * 1024);

        let empty = warp::test::request()
            .method("POST")
            .path("/analytics/events")
            .json(&serde_json::json!({}))
            .reply(&routes)
            .await;
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&empty)["error"], "No events provided");

        let malformed = warp::test::request()
            .method("POST")
            .path("/analytics/events")
            .body("{not json")
            .reply(&routes)
            .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&malformed)["success"], false);

        let too_many: Vec<_> =
            (0..1001).map(|i| serde_json::json!({"session_id": format!("s{i}"), "page_url": "/"})).collect();
        let oversized = warp::test::request()
            .method("POST")
            .path("/analytics/events")
            .json(&serde_json::json!({ "scrolls": too_many }))
            .reply(&routes)
            .await;
        assert_eq!(oversized.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(&oversized)["error"], "Too many events in single request (max 1000)");
    }

    #[tokio::test]
    async fn test_rate_limited_client_gets_429() {
        let routes = create_routes(state(Arc::new(MemoryStore::default()), 1), 1024 * 1024);
        let request = || {
            warp::test::request()
                .method("POST")
                .path("/analytics/events")
                .header("x-real-ip", "10.9.8.7")
                .json(&serde_json::json!({"sessions": [{"session_id": "s", "event_type": "session_start"}]}))
        };

        assert_eq!(request().reply(&routes).await.status(), StatusCode::OK);
        let limited = request().reply(&routes).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(&limited)["error"], "Too many requests from this IP");
    }

    #[tokio::test]
    async fn test_primary_failure_is_bad_request() {
        let store = Arc::new(MemoryStore { fail: true, ..Default::default() });
        let routes = create_routes(state(store, 10), 1024 * 1024);

        let response = warp::test::request()
            .method("POST")
            .path("/analytics/events")
            .json(&serde_json::json!({"page_views": [{"session_id": "s1", "page_url": "/"}]}))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(&response);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Failed to process events: "));
    }

    #[tokio::test]
    async fn test_health_reports_disabled_sinks() {
        let routes = create_routes(state(Arc::new(MemoryStore::default()), 10), 1024);
        let response = warp::test::request().path("/health").reply(&routes).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["healthy"], true);
        assert_eq!(body["clickhouse"], true);
        assert_eq!(body["redshift"], "disabled");
        assert_eq!(body["s3_export"], "disabled");

        let unhealthy = create_routes(
            state(Arc::new(MemoryStore { fail: true, ..Default::default() }), 10),
            1024,
        );
        let response = warp::test::request().path("/health").reply(&unhealthy).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ddl_allow_list_and_init_tables() {
        let statements = Arc::new(InstantStatements { submitted: Mutex::new(Vec::new()) });
        let mut api_state = state(Arc::new(MemoryStore::default()), 10);
        api_state.warehouse = Some(WarehouseAdmin {
            ddl: DdlExecutor::new(statements.clone(), Duration::from_millis(1), Duration::from_secs(1)),
            schema: "public".to_string(),
            batch_size: 1000,
            async_enabled: true,
        });
        let routes = create_routes(api_state, 1024);

        let rejected = warp::test::request()
            .method("POST")
            .path("/redshift/ddl")
            .json(&serde_json::json!({"sql": "DELETE FROM click_events"}))
            .reply(&routes)
            .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(&rejected)["error"],
            "Only DDL statements (CREATE, ALTER, DROP, GRANT, REVOKE) are allowed"
        );
        assert!(statements.submitted.lock().is_empty());

        let accepted = warp::test::request()
            .method("POST")
            .path("/redshift/ddl")
            .json(&serde_json::json!({"sql": "ALTER TABLE click_events ADD COLUMN campaign VARCHAR(64)"}))
            .reply(&routes)
            .await;
        assert_eq!(accepted.status(), StatusCode::OK);

        let init = warp::test::request().method("POST").path("/redshift/init-tables").reply(&routes).await;
        assert_eq!(init.status(), StatusCode::OK);
        assert_eq!(body_json(&init)["tables"].as_array().unwrap().len(), 4);
        assert_eq!(statements.submitted.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_warehouse_endpoints_when_disabled() {
        let routes = create_routes(state(Arc::new(MemoryStore::default()), 10), 1024);

        let health = warp::test::request().path("/redshift/health").reply(&routes).await;
        assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(&health)["status"], "disabled");

        let ddl = warp::test::request()
            .method("POST")
            .path("/redshift/ddl")
            .json(&serde_json::json!({"sql": "CREATE TABLE t (id INT)"}))
            .reply(&routes)
            .await;
        assert_eq!(ddl.status(), StatusCode::SERVICE_UNAVAILABLE);

        let info = warp::test::request().path("/analytics/database-info").reply(&routes).await;
        assert_eq!(body_json(&info)["database"], "analytics");
    }
}
