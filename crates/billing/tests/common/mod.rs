//! Shared fixtures for the billing integration tests

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use quanta_billing::signature::notification_signature;
use quanta_billing::store::MemoryStore;
use quanta_billing::{
    BillingError, BillingResult, EntitlementGate, GatewaySession, NotificationPayload,
    PaymentGateway, PaymentReconciler, SessionRequest, SubscriptionLifecycle, TokenLedger,
};
use quanta_shared::{PremiumPlan, Profile};

pub const SERVER_KEY: &str = "test-server-key";
pub const STATUS_CODE: &str = "200";

pub struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_session(&self, request: &SessionRequest) -> BillingResult<GatewaySession> {
        Ok(GatewaySession {
            token: format!("snap-{}", request.order_id),
            redirect_url: format!("https://gateway.test/redirect/{}", request.order_id),
        })
    }
}

pub struct FailingGateway;

#[async_trait]
impl PaymentGateway for FailingGateway {
    async fn create_session(&self, _request: &SessionRequest) -> BillingResult<GatewaySession> {
        Err(BillingError::GatewayUnavailable("connection refused".into()))
    }
}

pub struct TestCore {
    pub store: Arc<MemoryStore>,
    pub ledger: TokenLedger,
    pub subscriptions: SubscriptionLifecycle,
    pub gate: EntitlementGate,
    pub reconciler: PaymentReconciler,
}

pub fn core() -> TestCore {
    core_with_gateway(Arc::new(FakeGateway))
}

pub fn core_with_gateway(gateway: Arc<dyn PaymentGateway>) -> TestCore {
    let store = Arc::new(MemoryStore::new());
    let ledger = TokenLedger::new(store.clone(), store.clone());
    let subscriptions = SubscriptionLifecycle::new(store.clone());
    let gate = EntitlementGate::new(ledger.clone(), subscriptions.clone());
    let reconciler = PaymentReconciler::new(
        store.clone(),
        store.clone(),
        ledger.clone(),
        subscriptions.clone(),
        gateway,
        SERVER_KEY.to_string(),
    );
    TestCore {
        store,
        ledger,
        subscriptions,
        gate,
        reconciler,
    }
}

pub fn profile(tokens: i64) -> Profile {
    let now = OffsetDateTime::now_utc();
    Profile {
        id: Uuid::new_v4(),
        email: "user@example.com".to_string(),
        full_name: Some("Test User".to_string()),
        tokens,
        is_premium: false,
        premium_plan: None,
        premium_expires_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn premium_profile(tokens: i64, expires_at: OffsetDateTime) -> Profile {
    Profile {
        is_premium: true,
        premium_plan: Some(PremiumPlan::Monthly),
        premium_expires_at: Some(expires_at),
        ..profile(tokens)
    }
}

/// Build a correctly signed notification for `order_id`
pub fn signed_notification(
    order_id: &str,
    transaction_status: &str,
    gross_amount: &str,
    fraud_status: Option<&str>,
) -> NotificationPayload {
    NotificationPayload {
        order_id: order_id.to_string(),
        transaction_status: transaction_status.to_string(),
        status_code: STATUS_CODE.to_string(),
        gross_amount: gross_amount.to_string(),
        signature_key: notification_signature(order_id, STATUS_CODE, gross_amount, SERVER_KEY),
        fraud_status: fraud_status.map(str::to_string),
    }
}
