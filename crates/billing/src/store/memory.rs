//! In-memory store implementation
//!
//! Backs the integration tests and local development. Mirrors the Postgres
//! semantics: conditional balance updates, append-only logs, and a
//! pending-only guard on transaction finalization. Write failures can be
//! injected to exercise the ledger's rollback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use quanta_shared::{
    LedgerEntry, PaymentTransaction, Profile, TransactionStatus, UsageRecord,
};

use crate::error::{BillingError, BillingResult};
use crate::store::{
    LedgerStore, NewLedgerEntry, NewPaymentTransaction, NewUsageRecord, PremiumUpdate,
    ProfileStore, TransactionStore,
};

#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<Uuid, Profile>>,
    entries: Mutex<Vec<LedgerEntry>>,
    usage: Mutex<Vec<UsageRecord>>,
    transactions: Mutex<HashMap<String, PaymentTransaction>>,
    usage_failures: AtomicUsize,
    entry_failures: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.lock_profiles().insert(profile.id, profile);
    }

    /// Make the next `count` usage-record appends fail with `StoreUnavailable`
    pub fn inject_usage_failures(&self, count: usize) {
        self.usage_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` ledger-entry appends fail with `StoreUnavailable`
    pub fn inject_entry_failures(&self, count: usize) {
        self.entry_failures.store(count, Ordering::SeqCst);
    }

    pub fn entry_count(&self) -> usize {
        self.lock_entries().len()
    }

    fn lock_profiles(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Profile>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_usage(&self) -> std::sync::MutexGuard<'_, Vec<UsageRecord>> {
        self.usage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_transactions(&self) -> std::sync::MutexGuard<'_, HashMap<String, PaymentTransaction>> {
        self.transactions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn profile(&self, user_id: Uuid) -> BillingResult<Option<Profile>> {
        Ok(self.lock_profiles().get(&user_id).cloned())
    }

    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> BillingResult<bool> {
        let mut profiles = self.lock_profiles();
        match profiles.get_mut(&user_id) {
            Some(p) if p.tokens == expected => {
                p.tokens = new;
                p.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_premium(&self, user_id: Uuid, update: PremiumUpdate) -> BillingResult<()> {
        let mut profiles = self.lock_profiles();
        let profile = profiles
            .get_mut(&user_id)
            .ok_or(BillingError::ProfileNotFound(user_id))?;
        profile.is_premium = update.is_premium;
        profile.premium_plan = update.plan;
        profile.premium_expires_at = update.expires_at;
        profile.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> BillingResult<LedgerEntry> {
        if Self::take_failure(&self.entry_failures) {
            return Err(BillingError::StoreUnavailable(
                "injected ledger append failure".to_string(),
            ));
        }
        let row = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            entry_type: entry.entry_type,
            amount: entry.amount,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            transaction_id: entry.transaction_id,
            usage_id: entry.usage_id,
            description: entry.description,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock_entries().push(row.clone());
        Ok(row)
    }

    async fn append_usage(&self, record: NewUsageRecord) -> BillingResult<UsageRecord> {
        if Self::take_failure(&self.usage_failures) {
            return Err(BillingError::StoreUnavailable(
                "injected usage append failure".to_string(),
            ));
        }
        let row = UsageRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            feature_id: record.feature_id,
            category: record.category,
            tokens_consumed: record.tokens_consumed,
            external_units: record.external_units,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock_usage().push(row.clone());
        Ok(row)
    }

    async fn entries(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<LedgerEntry>> {
        let entries = self.lock_entries();
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn usage(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<UsageRecord>> {
        let usage = self.lock_usage();
        Ok(usage
            .iter()
            .rev()
            .filter(|u| u.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert(&self, txn: NewPaymentTransaction) -> BillingResult<PaymentTransaction> {
        let mut transactions = self.lock_transactions();
        if transactions.contains_key(&txn.order_id) {
            return Err(BillingError::StoreUnavailable(format!(
                "duplicate order id: {}",
                txn.order_id
            )));
        }
        let row = PaymentTransaction {
            id: Uuid::new_v4(),
            user_id: txn.user_id,
            order_id: txn.order_id.clone(),
            kind: txn.kind,
            item: txn.item,
            gross_amount: txn.gross_amount,
            tokens_amount: txn.tokens_amount,
            status: TransactionStatus::Pending,
            gateway_token: None,
            created_at: OffsetDateTime::now_utc(),
            completed_at: None,
        };
        transactions.insert(txn.order_id, row.clone());
        Ok(row)
    }

    async fn by_order_id(&self, order_id: &str) -> BillingResult<Option<PaymentTransaction>> {
        Ok(self.lock_transactions().get(order_id).cloned())
    }

    async fn set_gateway_token(&self, order_id: &str, token: &str) -> BillingResult<()> {
        if let Some(txn) = self.lock_transactions().get_mut(order_id) {
            txn.gateway_token = Some(token.to_string());
        }
        Ok(())
    }

    async fn finalize(
        &self,
        order_id: &str,
        status: TransactionStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> BillingResult<()> {
        if let Some(txn) = self.lock_transactions().get_mut(order_id) {
            if txn.status == TransactionStatus::Pending {
                txn.status = status;
                txn.completed_at = completed_at;
            }
        }
        Ok(())
    }
}
