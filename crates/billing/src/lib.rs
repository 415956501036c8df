//! Quanta Billing
//!
//! The entitlement and settlement core: the token ledger (atomic balance
//! mutation with audit trail), the feature-access gate, the subscription
//! lifecycle, and the payment-reconciliation state machine that converts
//! gateway settlement notifications into exactly-once credits.

pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod locks;
pub mod payment;
pub mod signature;
pub mod store;
pub mod subscription;

pub use entitlement::{AccessDecision, DenialReason, EntitlementGate};
pub use error::{BillingError, BillingResult};
pub use gateway::{GatewayConfig, GatewaySession, PaymentGateway, SessionRequest, SnapGateway};
pub use ledger::{CreditKind, TokenLedger};
pub use payment::{
    CreatedPayment, NotificationOutcome, NotificationPayload, PaymentReconciler, PaymentRequest,
};
pub use subscription::{SubscriptionLifecycle, SubscriptionStatus};
