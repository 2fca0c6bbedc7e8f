use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::queue::QueueError;

/// Failure of an HTTP action, rendered as
/// `{"error": {"message": ..., "description": ...}}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("resource not found")]
    RouteNotFound(String),
    #[error("method not allowed")]
    MethodNotAllowed(String),
    #[error("panic: {0}")]
    Panic(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Queue(QueueError::NotFound(_) | QueueError::Closed(_)) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Queue(QueueError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::Queue(QueueError::MalformedInput(_) | QueueError::InvalidName(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Queue(_) | ApiError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ApiError::Queue(QueueError::NotFound(_) | QueueError::Closed(_)) => {
                "Queue not found".to_string()
            }
            ApiError::Queue(QueueError::AlreadyExists(_)) => "Queue already exists".to_string(),
            ApiError::Queue(QueueError::InvalidName(_)) => "Invalid queue name".to_string(),
            ApiError::Queue(QueueError::MalformedInput(_)) => "Malformed JSON".to_string(),
            ApiError::RouteNotFound(uri) => format!("resource '{}' not found", uri),
            ApiError::MethodNotAllowed(method) => format!("method '{}' not allowed", method),
            ApiError::Queue(_) | ApiError::Panic(_) => "Unexpected error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }

        let body = json!({
            "error": {
                "message": self.to_string(),
                "description": self.description(),
            }
        });
        (status, Json(body)).into_response()
    }
}
