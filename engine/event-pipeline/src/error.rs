//! Error types for the ingestion pipeline

use crate::events::EventKind;
use crate::validation::ValidationError;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that reject or fail an ingestion request as a whole
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Admission control denied the client
    #[error("Too many requests from this IP")]
    RateLimited { client: String },

    /// The request carried no events at all
    #[error("No events provided")]
    EmptyBatch,

    /// The request exceeded the per-call event cap
    #[error("Too many events in single request (max {max})")]
    BatchTooLarge { count: usize, max: usize },

    /// Every event in the request failed validation
    #[error("No valid events to process")]
    NoValidEvents { errors: Vec<ValidationError> },

    /// The primary store rejected a kind's batch
    #[error("Failed to process events: {source}")]
    PrimaryStore {
        kind: EventKind,
        #[source]
        source: StoreError,
    },
}

impl PipelineError {
    /// Per-event errors collected before the request failed, if any
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            Self::NoValidEvents { errors } => errors,
            _ => &[],
        }
    }
}

/// Errors raised by the primary store or the warehouse
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP transport errors talking to the columnar store
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered but refused the statement
    #[error("store returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// SQL errors from the warehouse connection
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Row serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A sub-batch failed after earlier sub-batches were committed
    #[error("sub-batch {chunk} failed after {committed} rows committed: {message}")]
    PartialCommit { chunk: usize, committed: usize, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Errors raised while exporting to object storage
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),
}

/// Errors raised by the synchronous warehouse DDL path
#[derive(Error, Debug)]
pub enum DdlError {
    #[error("SQL statement is required")]
    EmptyStatement,

    #[error("Only DDL statements (CREATE, ALTER, DROP, GRANT, REVOKE) are allowed")]
    NotAllowed,

    #[error("statement {id} failed with status {status}: {message}")]
    Failed { id: String, status: String, message: String },

    #[error("statement {id} timed out after {seconds} seconds")]
    Timeout { id: String, seconds: u64 },

    #[error("unknown statement id: {0}")]
    UnknownStatement(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}
