// crates/server/src/error.rs
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use codescan_core::RepoUrlError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<RepoUrlError> for ApiError {
    fn from(err: RepoUrlError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

// Body problems of every kind (syntax, missing field, content type) are 400.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(msg.clone()))
            }
            ApiError::Unauthorized(reason) => {
                tracing::warn!(reason = %reason, "Rejected request");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new(format!("Unauthorized, {reason}")),
                )
            }
            ApiError::JobNotFound(project) => {
                tracing::debug!(project = %project, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Task not found", format!("Project: {project}")),
                )
            }
            ApiError::Conflict(msg) => {
                tracing::warn!(message = %msg, "Conflict");
                (StatusCode::CONFLICT, ErrorResponse::new(msg.clone()))
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
