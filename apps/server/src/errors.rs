use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::models::ApiResponse;

/// Typed failures crossing the engine/API boundary.
///
/// `SlotUnavailable` and `TransientContention` are deliberately distinct:
/// the first means the requested interval is taken, the second means the
/// serialization key could not be acquired in time and the caller should
/// retry with backoff.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("slot unavailable: {0}")]
    SlotUnavailable(&'static str),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("appointment not found")]
    AppointmentNotFound,

    #[error("no change requested")]
    NoChangeRequested,

    #[error("booking contention, retry shortly")]
    TransientContention,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::SlotUnavailable(_) => StatusCode::CONFLICT,
            AppError::InvalidDuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AppointmentNotFound => StatusCode::NOT_FOUND,
            AppError::NoChangeRequested => StatusCode::BAD_REQUEST,
            AppError::TransientContention => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if let AppError::Database(e) = &self {
            tracing::error!("database error: {}", e);
        }

        let body = Json(ApiResponse::<()>::error(self.to_string()));

        if status == StatusCode::SERVICE_UNAVAILABLE {
            // Contention is retryable; say so explicitly.
            return (status, [("Retry-After", "1")], body).into_response();
        }

        (status, body).into_response()
    }
}
