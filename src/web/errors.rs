//! API error type with HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::orchestration::errors::OrchestrationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_type: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "idempotency_conflict", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error_type,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(error: OrchestrationError) -> Self {
        let status = match &error {
            OrchestrationError::Validation { .. }
            | OrchestrationError::MissingIdempotencyKey { .. } => StatusCode::BAD_REQUEST,
            // A duplicate in-flight request is a distinct status, not a
            // server failure; the caller should poll or back off.
            OrchestrationError::IdempotencyConflict { .. } => StatusCode::CONFLICT,
            OrchestrationError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrchestrationError::CollaboratorUnavailable { .. }
            | OrchestrationError::CollaboratorRequest { .. }
            | OrchestrationError::CollaboratorLogical { .. } => StatusCode::BAD_GATEWAY,
            OrchestrationError::PollingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            OrchestrationError::Configuration { .. }
            | OrchestrationError::StateTransition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.error_type(), error.to_string())
    }
}
