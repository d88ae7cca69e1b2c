//! Error types shared by the ingestion, rule-engine, and device services.
//!
//! Custom error enum that wraps all possible error types in the application.
//! Similar to Java exception hierarchy, but using Rust's Result type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for pipeline operations
///
/// Java equivalent: Custom exception hierarchy
/// ```java
/// class PipelineException extends Exception { }
/// class DatabaseException extends PipelineException { }
/// ```
#[derive(Debug, Error)]
pub enum Error {
    /// Database errors (PostgreSQL via sqlx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Broker errors (Redis)
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Authentication/authorization failures (bad or expired bearer credential)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Invalid JWT token
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request validation errors (`invalid_input` in the error design table)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Tenant-scoped lookup miss
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate active connection/identity — caller should treat as informational
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient failure of an external dependency (HTTP, broker, DB)
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catch-all for startup/bootstrap failures
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) | Error::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Broker(_) | Error::Config(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("name is required".to_string());
        assert_eq!(err.to_string(), "Validation error: name is required");
    }

    #[test]
    fn test_error_conversion() {
        let sql_err = sqlx::Error::RowNotFound;
        let our_err: Error = sql_err.into();
        assert!(matches!(our_err, Error::Database(_)));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = Error::NotFound("device d1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let response = Error::Conflict("identity already connected".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
