//! Error types for aarc-dl
//!
//! `JobError` is raised by the orchestration core; `ApiError` is what HTTP
//! handlers return and knows how to render itself.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use aarc_common::events::JobStatus;

/// Job registry / queue error
#[derive(Debug, Error, PartialEq)]
pub enum JobError {
    /// No job with this id in the registry
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Request is valid but conflicts with the job's current state
    #[error("{0}")]
    Conflict(String),

    /// Attempted status change is not an edge of the lifecycle graph
    #[error("Invalid job transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., job already cancelled
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => ApiError::NotFound(format!("Job not found: {}", id)),
            JobError::Conflict(msg) => ApiError::Conflict(msg),
            e @ JobError::InvalidTransition { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
