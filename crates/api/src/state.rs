//! Shared application state

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use quanta_billing::store::{PgLedgerStore, PgProfileStore, PgTransactionStore};
use quanta_billing::{
    EntitlementGate, GatewayConfig, PaymentReconciler, SnapGateway, SubscriptionLifecycle,
    TokenLedger,
};

use crate::config::Config;

/// Shared state available to all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ledger: TokenLedger,
    pub subscriptions: SubscriptionLifecycle,
    pub gate: EntitlementGate,
    pub reconciler: Arc<PaymentReconciler>,
}

impl AppState {
    /// Wire the billing core onto Postgres-backed stores
    pub fn new(pool: PgPool, config: &Config) -> anyhow::Result<Self> {
        let profiles = Arc::new(PgProfileStore::new(pool.clone()));
        let log = Arc::new(PgLedgerStore::new(pool.clone()));
        let transactions = Arc::new(PgTransactionStore::new(pool.clone()));

        let gateway_config = GatewayConfig {
            server_key: config.gateway_server_key.clone(),
            production: config.gateway_production,
            callback_base_url: config.frontend_url.clone(),
            request_timeout: Duration::from_secs(10),
        };
        let gateway = Arc::new(SnapGateway::new(gateway_config)?);

        let ledger = TokenLedger::new(profiles.clone(), log);
        let subscriptions = SubscriptionLifecycle::new(profiles.clone());
        let gate = EntitlementGate::new(ledger.clone(), subscriptions.clone());
        let reconciler = Arc::new(PaymentReconciler::new(
            transactions,
            profiles,
            ledger.clone(),
            subscriptions.clone(),
            gateway,
            config.gateway_server_key.clone(),
        ));

        Ok(Self {
            pool,
            ledger,
            subscriptions,
            gate,
            reconciler,
        })
    }
}
