//! HTTP error responses.
//!
//! Every failure is rendered as `{ "error": { "code", "message" } }` with a
//! status code derived from the underlying error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use staffsync_core::CoreError;
use thiserror::Error;
use tracing::error;

/// Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the administrative API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request parameters or body.
    #[error("{0}")]
    BadRequest(String),

    /// The requested event does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the event's current state.
    #[error("{0}")]
    Conflict(String),

    /// The event store failed.
    #[error("{0}")]
    Storage(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_REQUEST",
            Self::NotFound(_) => "EVENT_NOT_FOUND",
            Self::Conflict(_) => "EVENT_IN_PROGRESS",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(message) => Self::BadRequest(message),
            CoreError::NotFound(message) => Self::NotFound(message),
            CoreError::ConstraintViolation(message) => Self::Conflict(message),
            CoreError::Database(message) => Self::Storage(message),
        }
    }
}

/// Error response with code and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: ErrorDetail { code: self.code().to_string(), message: self.to_string() },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_status_codes() {
        let cases = [
            (CoreError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (CoreError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (CoreError::ConstraintViolation("busy".into()), StatusCode::CONFLICT),
            (CoreError::Database("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (core, status) in cases {
            assert_eq!(ApiError::from(core).status(), status);
        }
    }

    #[test]
    fn response_carries_status() {
        let response = ApiError::NotFound("event 7 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
