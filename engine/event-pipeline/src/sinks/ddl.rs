//! Out-of-band warehouse DDL
//!
//! Statements are submitted as jobs and polled until they reach a terminal
//! state or the timeout expires. This path is slow on purpose and is only used
//! for table bootstrap and admin tooling, never from ingestion.

use crate::error::DdlError;
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Leading keywords accepted by the DDL path
pub const ALLOWED_DDL_KEYWORDS: [&str; 5] = ["CREATE", "ALTER", "DROP", "GRANT", "REVOKE"];

/// Reject anything that does not start with an allowed DDL keyword
pub fn validate_ddl(sql: &str) -> Result<(), DdlError> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(DdlError::EmptyStatement);
    }

    let keyword = sql.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
    if ALLOWED_DDL_KEYWORDS.contains(&keyword.as_str()) {
        Ok(())
    } else {
        Err(DdlError::NotAllowed)
    }
}

/// Status of a submitted statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Started,
    Finished,
    Failed(String),
    Aborted,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed(_) | JobStatus::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Started => "STARTED",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed(_) => "FAILED",
            JobStatus::Aborted => "ABORTED",
        }
    }
}

/// Asynchronous statement API: submit returns a job id, describe reports its status
#[async_trait]
pub trait StatementApi: Send + Sync {
    async fn submit(&self, sql: &str) -> Result<String, DdlError>;

    async fn describe(&self, id: &str) -> Result<JobStatus, DdlError>;
}

/// Statement jobs executed on the warehouse pool in spawned tasks
#[derive(Debug, Clone)]
pub struct StatementJobs {
    pool: PgPool,
    jobs: Arc<DashMap<String, JobStatus>>,
}

impl StatementJobs {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, jobs: Arc::new(DashMap::new()) }
    }
}

#[async_trait]
impl StatementApi for StatementJobs {
    async fn submit(&self, sql: &str) -> Result<String, DdlError> {
        let id = Uuid::new_v4().to_string();
        self.jobs.insert(id.clone(), JobStatus::Submitted);

        let pool = self.pool.clone();
        let jobs = self.jobs.clone();
        let sql = sql.to_string();
        let job_id = id.clone();
        tokio::spawn(async move {
            jobs.insert(job_id.clone(), JobStatus::Started);
            let status = match sqlx::raw_sql(&sql).execute(&pool).await {
                Ok(_) => JobStatus::Finished,
                Err(e) => JobStatus::Failed(e.to_string()),
            };
            jobs.insert(job_id, status);
        });

        Ok(id)
    }

    async fn describe(&self, id: &str) -> Result<JobStatus, DdlError> {
        let status = self
            .jobs
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| DdlError::UnknownStatement(id.to_string()))?;

        // Terminal jobs are reported once
        if status.is_terminal() {
            self.jobs.remove(id);
        }
        Ok(status)
    }
}

/// Runs DDL through a [`StatementApi`] and waits for completion
#[derive(Clone)]
pub struct DdlExecutor {
    api: Arc<dyn StatementApi>,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for DdlExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DdlExecutor")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DdlExecutor {
    pub fn new(api: Arc<dyn StatementApi>, poll_interval: Duration, timeout: Duration) -> Self {
        Self { api, poll_interval, timeout }
    }

    /// Execute one statement. Returns the job id once it has finished.
    pub async fn execute(&self, sql: &str) -> Result<String, DdlError> {
        validate_ddl(sql)?;

        let id = self.api.submit(sql.trim()).await?;
        info!("Submitted DDL statement {}", id);

        let deadline = Instant::now() + self.timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let status = self.api.describe(&id).await?;
            debug!("DDL statement {} is {}", id, status.as_str());

            match status {
                JobStatus::Finished => {
                    info!("DDL statement {} finished", id);
                    return Ok(id);
                }
                JobStatus::Failed(message) => {
                    error!("DDL statement {} failed: {}", id, message);
                    return Err(DdlError::Failed { id, status: "FAILED".to_string(), message });
                }
                JobStatus::Aborted => {
                    error!("DDL statement {} was aborted", id);
                    return Err(DdlError::Failed {
                        id,
                        status: "ABORTED".to_string(),
                        message: "statement aborted".to_string(),
                    });
                }
                JobStatus::Submitted | JobStatus::Started => {}
            }

            if Instant::now() >= deadline {
                error!("DDL statement {} timed out", id);
                return Err(DdlError::Timeout { id, seconds: self.timeout.as_secs() });
            }
        }
    }

    /// Execute statements in order, stopping at the first failure
    pub async fn execute_all<I, S>(&self, statements: I) -> Result<Vec<String>, DdlError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids = Vec::new();
        for statement in statements {
            ids.push(self.execute(statement.as_ref()).await?);
        }
        Ok(ids)
    }
}
