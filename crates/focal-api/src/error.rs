//! HTTP error mapping for the API surface.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

/// API-level error with an HTTP status.
///
/// Handlers return `Result<_, ApiError>`; the `From<focal_core::Error>`
/// impl lets `?` map domain errors straight to responses.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Database(focal_core::Error),
    Internal(String),
}

impl From<focal_core::Error> for ApiError {
    fn from(err: focal_core::Error) -> Self {
        match &err {
            focal_core::Error::Validation(msg) => ApiError::BadRequest(msg.clone()),
            // Caller identity does not own the row; auth itself happened upstream.
            focal_core::Error::Unauthorized(msg) => ApiError::Forbidden(msg.clone()),
            focal_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            focal_core::Error::DuplicateConnection { connection_id } => {
                ApiError::Conflict(format!("connection {} already registered", connection_id))
            }
            focal_core::Error::Serialization(msg) => ApiError::BadRequest(msg.clone()),
            focal_core::Error::Database(_) => ApiError::Database(err),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal database error".to_string(),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
