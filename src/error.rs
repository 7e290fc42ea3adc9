use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::time_utils::TimeError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid time: {0}")]
    Time(#[from] TimeError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::Time(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PaymentProvider(_) => StatusCode::BAD_GATEWAY,
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (error, message) = match &self {
            AppError::Database(sqlx::Error::RowNotFound) => {
                ("not_found", "Resource not found".to_string())
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ("database_error", "Database error".to_string())
            }
            AppError::Validation(msg) => ("validation_error", msg.clone()),
            AppError::Time(e) => ("validation_error", e.to_string()),
            AppError::NotFound(msg) => ("not_found", msg.clone()),
            AppError::Conflict(msg) => ("conflict", msg.clone()),
            AppError::Unauthorized => ("unauthorized", "Unauthorized".to_string()),
            AppError::Forbidden(msg) => ("forbidden", msg.clone()),
            AppError::TooManyRequests(msg) => ("too_many_requests", msg.clone()),
            AppError::PaymentProvider(msg) => ("payment_provider_error", msg.clone()),
            AppError::Session(e) => {
                tracing::error!(error = %e, "Session error");
                ("session_error", "Session error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "Internal error");
                ("internal_error", "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Time(TimeError::InvalidInterval(0)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Conflict("taken".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_time_error_converts() {
        let err: AppError = TimeError::InvalidFormat("25:00".into()).into();
        assert!(matches!(err, AppError::Time(TimeError::InvalidFormat(_))));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
