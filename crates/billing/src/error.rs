//! Billing error types

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the entitlement and settlement core
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("insufficient token balance: required {required}, current {current}")]
    InsufficientBalance { required: i64, current: i64 },

    #[error("premium subscription required")]
    PremiumRequired,

    #[error("notification signature verification failed")]
    InvalidSignature,

    #[error("unknown transaction: {order_id}")]
    UnknownTransaction { order_id: String },

    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    #[error("unknown plan or package: {0}")]
    UnknownItem(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(Uuid),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Corrupted account state (e.g. a negative stored balance). Fatal to the
    /// operation; mutation must not proceed on this account.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// Whether the caller may retry the same operation without user action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::GatewayUnavailable(_) | BillingError::StoreUnavailable(_)
        )
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::StoreUnavailable(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(BillingError::StoreUnavailable("down".into()).is_retryable());
        assert!(BillingError::GatewayUnavailable("503".into()).is_retryable());
        assert!(!BillingError::PremiumRequired.is_retryable());
        assert!(!BillingError::InsufficientBalance {
            required: 3,
            current: 1
        }
        .is_retryable());
    }
}
