//! Persistent-store seam
//!
//! The core is specified against abstract record stores: a profile store with
//! atomic per-record conditional updates, an append-only ledger log store,
//! and a payment transaction store. Production uses the Postgres
//! implementations; tests and local development use the in-memory store.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use quanta_shared::{
    LedgerEntry, LedgerEntryType, PaymentTransaction, PremiumPlan, Profile, TransactionKind,
    TransactionStatus, UsageRecord,
};

use crate::error::BillingResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgLedgerStore, PgProfileStore, PgTransactionStore};

/// Premium fields written by the subscription lifecycle
#[derive(Debug, Clone)]
pub struct PremiumUpdate {
    pub is_premium: bool,
    pub plan: Option<PremiumPlan>,
    pub expires_at: Option<OffsetDateTime>,
}

impl PremiumUpdate {
    /// Clears premium status, used for lazy deactivation on expiry
    pub fn deactivated() -> Self {
        Self {
            is_premium: false,
            plan: None,
            expires_at: None,
        }
    }
}

/// A ledger entry before it is assigned an id and timestamp
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub transaction_id: Option<Uuid>,
    pub usage_id: Option<Uuid>,
    pub description: String,
}

/// A usage record before it is assigned an id and timestamp
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub user_id: Uuid,
    pub feature_id: String,
    pub category: String,
    pub tokens_consumed: i64,
    pub external_units: Option<i64>,
}

/// A payment transaction at creation time (always `pending`)
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub user_id: Uuid,
    pub order_id: String,
    pub kind: TransactionKind,
    pub item: String,
    pub gross_amount: i64,
    pub tokens_amount: Option<i64>,
}

/// Per-user balance/subscription records with atomic single-record updates
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn profile(&self, user_id: Uuid) -> BillingResult<Option<Profile>>;

    /// Conditionally set the token balance: succeeds only if the stored
    /// balance still equals `expected`. Returns whether the write applied.
    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> BillingResult<bool>;

    async fn set_premium(&self, user_id: Uuid, update: PremiumUpdate) -> BillingResult<()>;
}

/// Append-only token-movement and usage records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_entry(&self, entry: NewLedgerEntry) -> BillingResult<LedgerEntry>;

    async fn append_usage(&self, record: NewUsageRecord) -> BillingResult<UsageRecord>;

    /// Most recent entries first
    async fn entries(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<LedgerEntry>>;

    /// Most recent usage records first
    async fn usage(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<UsageRecord>>;
}

/// Payment transactions keyed by globally unique order id
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, txn: NewPaymentTransaction) -> BillingResult<PaymentTransaction>;

    async fn by_order_id(&self, order_id: &str) -> BillingResult<Option<PaymentTransaction>>;

    async fn set_gateway_token(&self, order_id: &str, token: &str) -> BillingResult<()>;

    /// Move a `pending` transaction to a terminal status. A transaction
    /// already terminal is left untouched.
    async fn finalize(
        &self,
        order_id: &str,
        status: TransactionStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> BillingResult<()>;
}
