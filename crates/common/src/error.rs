use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Common error types used across the pipeline.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("Channel policy error: {0}")]
    Policy(String),

    #[error("Unknown recipient type: {0}")]
    UnknownRecipientType(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether retrying the same message later can succeed.
    ///
    /// Infrastructure failures are transient. Routing and payload errors are
    /// properties of the message itself and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Redis(_)
                | AppError::Bus(_)
                | AppError::Policy(_)
                | AppError::Internal(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Serialization(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Bus(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Policy(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::UnknownRecipientType(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::MalformedPayload(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AppError::Bus("connection reset".into()).is_retryable());
        assert!(AppError::Policy("rules table unavailable".into()).is_retryable());
        assert!(!AppError::UnknownRecipientType("SUPPLIER".into()).is_retryable());
        assert!(!AppError::MalformedPayload("conversationId missing".into()).is_retryable());
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::NotFound("outbox event 9".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
