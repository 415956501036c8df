//! Entitlement Gate
//!
//! Read-only policy check run before any paid work executes: resolved
//! premium status first, then token balance. The check is advisory; it does
//! not reserve tokens. The actual deduction happens in
//! [`TokenLedger::consume`](crate::ledger::TokenLedger::consume), which
//! re-checks the balance under the per-user lock, so a concurrent request
//! slipping between check and consume surfaces as `InsufficientBalance`
//! there, never as a negative balance.

use serde::Serialize;
use uuid::Uuid;

use quanta_shared::catalog;

use crate::error::{BillingError, BillingResult};
use crate::ledger::TokenLedger;
use crate::subscription::SubscriptionLifecycle;

/// Why a feature request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    PremiumRequired,
    InsufficientTokens { required: i64, current: i64 },
}

/// Outcome of an entitlement check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

#[derive(Clone)]
pub struct EntitlementGate {
    ledger: TokenLedger,
    subscriptions: SubscriptionLifecycle,
}

impl EntitlementGate {
    pub fn new(ledger: TokenLedger, subscriptions: SubscriptionLifecycle) -> Self {
        Self {
            ledger,
            subscriptions,
        }
    }

    /// Decide whether `user_id` may invoke `feature_id` right now.
    ///
    /// Premium features consult the resolved, expiry-checked subscription
    /// status, not the stored flag. An unknown feature id is an error, not a
    /// denial.
    pub async fn authorize(&self, user_id: Uuid, feature_id: &str) -> BillingResult<AccessDecision> {
        let feature = catalog::feature(feature_id)
            .ok_or_else(|| BillingError::UnknownFeature(feature_id.to_string()))?;

        if feature.is_premium {
            let status = self.subscriptions.resolve_status(user_id).await?;
            if !status.active {
                tracing::debug!(
                    user_id = %user_id,
                    feature_id = %feature_id,
                    "Denied: premium required"
                );
                return Ok(AccessDecision::Denied(DenialReason::PremiumRequired));
            }
        }

        let current = self.ledger.balance(user_id).await?;
        if current < feature.token_cost {
            tracing::debug!(
                user_id = %user_id,
                feature_id = %feature_id,
                required = feature.token_cost,
                current = current,
                "Denied: insufficient tokens"
            );
            return Ok(AccessDecision::Denied(DenialReason::InsufficientTokens {
                required: feature.token_cost,
                current,
            }));
        }

        Ok(AccessDecision::Granted)
    }
}
