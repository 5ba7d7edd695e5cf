use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code, independent of the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Persistence(_) => "PERSISTENCE",
            AppError::InvalidAmount(_) => "INVALID_AMOUNT",
            AppError::Validation(_) => "VALIDATION",
            AppError::Unauthenticated(_) => "UNAUTHENTICATED",
            AppError::InvalidSignature => "INVALID_SIGNATURE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Gateway(_) => "GATEWAY",
            AppError::Configuration(_) => "CONFIGURATION",
            AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.kind(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_amount_status_code() {
        let error = AppError::InvalidAmount("must be greater than zero".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.kind(), "INVALID_AMOUNT");
    }

    #[test]
    fn test_validation_error_status_code() {
        let error = AppError::Validation(ValidationError::new("currency", "must be one of: XOF"));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(error.kind(), "VALIDATION");
    }

    #[test]
    fn test_unauthenticated_status_code() {
        let error = AppError::Unauthenticated("missing session token".to_string());
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.kind(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_invalid_signature_status_code() {
        let error = AppError::InvalidSignature;
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.kind(), "INVALID_SIGNATURE");
    }

    #[test]
    fn test_not_found_status_code() {
        let error = AppError::NotFound("transaction txn_x not found".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflict_status_code() {
        let error = AppError::Conflict("transaction already ACCEPTED".to_string());
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert_eq!(error.kind(), "CONFLICT");
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.kind(), "PERSISTENCE");
    }

    #[test]
    fn test_gateway_error_status_code() {
        let error = AppError::Gateway(GatewayError::CircuitOpen);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.kind(), "GATEWAY");
    }

    #[tokio::test]
    async fn test_invalid_amount_response() {
        let error = AppError::InvalidAmount("amount is required".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_signature_response() {
        let error = AppError::InvalidSignature;
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
