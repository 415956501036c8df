//! Postgres store implementations

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use quanta_shared::{LedgerEntry, PaymentTransaction, Profile, TransactionStatus, UsageRecord};

use crate::error::BillingResult;
use crate::store::{
    LedgerStore, NewLedgerEntry, NewPaymentTransaction, NewUsageRecord, PremiumUpdate,
    ProfileStore, TransactionStore,
};

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn profile(&self, user_id: Uuid) -> BillingResult<Option<Profile>> {
        let profile: Option<Profile> = sqlx::query_as(
            r#"
            SELECT id, email, full_name, tokens, is_premium, premium_plan,
                   premium_expires_at, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn swap_balance(&self, user_id: Uuid, expected: i64, new: i64) -> BillingResult<bool> {
        // Conditional update doubles as a compare-and-swap so a concurrent
        // writer in another process cannot cause a lost update
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET tokens = $3, updated_at = NOW()
            WHERE id = $1 AND tokens = $2
            "#,
        )
        .bind(user_id)
        .bind(expected)
        .bind(new)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_premium(&self, user_id: Uuid, update: PremiumUpdate) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE profiles
            SET is_premium = $2, premium_plan = $3, premium_expires_at = $4, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(update.is_premium)
        .bind(update.plan.map(|p| p.to_string()))
        .bind(update.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> BillingResult<LedgerEntry> {
        let row: LedgerEntry = sqlx::query_as(
            r#"
            INSERT INTO ledger_entries (
                id, user_id, entry_type, amount, balance_before, balance_after,
                transaction_id, usage_id, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, entry_type, amount, balance_before, balance_after,
                      transaction_id, usage_id, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.entry_type.to_string())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.transaction_id)
        .bind(entry.usage_id)
        .bind(&entry.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn append_usage(&self, record: NewUsageRecord) -> BillingResult<UsageRecord> {
        let row: UsageRecord = sqlx::query_as(
            r#"
            INSERT INTO usage_records (
                id, user_id, feature_id, category, tokens_consumed, external_units
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, feature_id, category, tokens_consumed, external_units,
                      created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(&record.feature_id)
        .bind(&record.category)
        .bind(record.tokens_consumed)
        .bind(record.external_units)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn entries(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<LedgerEntry>> {
        let rows: Vec<LedgerEntry> = sqlx::query_as(
            r#"
            SELECT id, user_id, entry_type, amount, balance_before, balance_after,
                   transaction_id, usage_id, description, created_at
            FROM ledger_entries
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn usage(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<UsageRecord>> {
        let rows: Vec<UsageRecord> = sqlx::query_as(
            r#"
            SELECT id, user_id, feature_id, category, tokens_consumed, external_units,
                   created_at
            FROM usage_records
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert(&self, txn: NewPaymentTransaction) -> BillingResult<PaymentTransaction> {
        let row: PaymentTransaction = sqlx::query_as(
            r#"
            INSERT INTO payment_transactions (
                id, user_id, order_id, kind, item, gross_amount, tokens_amount, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending')
            RETURNING id, user_id, order_id, kind, item, gross_amount, tokens_amount,
                      status, gateway_token, created_at, completed_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(txn.user_id)
        .bind(&txn.order_id)
        .bind(txn.kind.to_string())
        .bind(&txn.item)
        .bind(txn.gross_amount)
        .bind(txn.tokens_amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn by_order_id(&self, order_id: &str) -> BillingResult<Option<PaymentTransaction>> {
        let row: Option<PaymentTransaction> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_id, kind, item, gross_amount, tokens_amount,
                   status, gateway_token, created_at, completed_at
            FROM payment_transactions
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn set_gateway_token(&self, order_id: &str, token: &str) -> BillingResult<()> {
        sqlx::query("UPDATE payment_transactions SET gateway_token = $2 WHERE order_id = $1")
            .bind(order_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn finalize(
        &self,
        order_id: &str,
        status: TransactionStatus,
        completed_at: Option<OffsetDateTime>,
    ) -> BillingResult<()> {
        // The status guard keeps terminal states terminal even if a caller
        // races past the in-process critical section
        sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = $2, completed_at = $3
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id)
        .bind(status.to_string())
        .bind(completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
