//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use quanta_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Billing(#[from] BillingError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Billing(err) => match err {
                BillingError::InsufficientBalance { .. } => {
                    (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_TOKENS", err.to_string())
                }
                BillingError::PremiumRequired => {
                    (StatusCode::FORBIDDEN, "PREMIUM_REQUIRED", err.to_string())
                }
                BillingError::InvalidSignature => {
                    (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", err.to_string())
                }
                BillingError::UnknownTransaction { .. } => {
                    (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND", err.to_string())
                }
                BillingError::UnknownFeature(_) => {
                    (StatusCode::NOT_FOUND, "FEATURE_NOT_FOUND", err.to_string())
                }
                BillingError::UnknownItem(_) => {
                    (StatusCode::BAD_REQUEST, "UNKNOWN_ITEM", err.to_string())
                }
                BillingError::ProfileNotFound(_) => {
                    (StatusCode::NOT_FOUND, "PROFILE_NOT_FOUND", err.to_string())
                }
                BillingError::GatewayUnavailable(_) => {
                    tracing::error!("Gateway error: {err}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "GATEWAY_UNAVAILABLE",
                        "Payment gateway unavailable".to_string(),
                    )
                }
                BillingError::StoreUnavailable(_) => {
                    tracing::error!("Store error: {err}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "SERVICE_UNAVAILABLE",
                        "Service temporarily unavailable".to_string(),
                    )
                }
                BillingError::InvariantViolation(_) | BillingError::Config(_) => {
                    tracing::error!("Internal error: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "Internal server error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
