//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use history_store::HistoryStoreError;
use orchestration::OrchestrationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Request conflicts with the instance's current state.
    Conflict(String),
    /// Engine error.
    Orchestration(OrchestrationError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Orchestration(err) => orchestration_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn orchestration_error_to_response(err: OrchestrationError) -> (StatusCode, String) {
    let status = match &err {
        OrchestrationError::InstanceNotFound(_)
        | OrchestrationError::HistoryStore(HistoryStoreError::InstanceNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        OrchestrationError::InvalidInstanceId(_) => StatusCode::BAD_REQUEST,
        OrchestrationError::HistoryStore(
            HistoryStoreError::InstanceAlreadyExists(_) | HistoryStoreError::InstanceTerminal(_),
        ) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "orchestration error");
    }
    (status, err.to_string())
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        ApiError::Orchestration(err)
    }
}
