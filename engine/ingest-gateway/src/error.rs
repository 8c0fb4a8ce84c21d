//! Error types for the IngestGateway

use event_pipeline::{DdlError, PipelineError};
use thiserror::Error;
use warp::http::StatusCode;

/// Errors that can occur in the IngestGateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Ddl(#[from] DdlError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Warehouse is not enabled")]
    WarehouseDisabled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl GatewayError {
    /// HTTP status reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Pipeline(PipelineError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Pipeline(_) => StatusCode::BAD_REQUEST,
            GatewayError::Ddl(DdlError::EmptyStatement | DdlError::NotAllowed) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Ddl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::WarehouseDisabled => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Config(_) | GatewayError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result type for IngestGateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
