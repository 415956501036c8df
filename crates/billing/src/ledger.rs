//! Token Ledger
//!
//! Owns every balance mutation. Each mutation pairs a conditional balance
//! write with exactly one append-only ledger entry, so the entry log replays
//! to every historical balance. Mutations for one user are serialized by a
//! per-user lock on top of the store's compare-and-swap update.

use std::sync::Arc;

use uuid::Uuid;

use quanta_shared::{LedgerEntry, LedgerEntryType, UsageRecord};

use crate::error::{BillingError, BillingResult};
use crate::locks::LockMap;
use crate::store::{LedgerStore, NewLedgerEntry, NewUsageRecord, ProfileStore};

/// Credit kinds accepted by [`TokenLedger::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    Purchase,
    Bonus,
}

impl From<CreditKind> for LedgerEntryType {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Purchase => LedgerEntryType::Purchase,
            CreditKind::Bonus => LedgerEntryType::Bonus,
        }
    }
}

#[derive(Clone)]
pub struct TokenLedger {
    profiles: Arc<dyn ProfileStore>,
    log: Arc<dyn LedgerStore>,
    locks: Arc<LockMap<Uuid>>,
}

impl TokenLedger {
    pub fn new(profiles: Arc<dyn ProfileStore>, log: Arc<dyn LedgerStore>) -> Self {
        Self {
            profiles,
            log,
            locks: Arc::new(LockMap::new()),
        }
    }

    /// Current token balance; 0 for an unknown user.
    pub async fn balance(&self, user_id: Uuid) -> BillingResult<i64> {
        match self.profiles.profile(user_id).await? {
            Some(profile) => {
                Self::check_balance_invariant(user_id, profile.tokens)?;
                Ok(profile.tokens)
            }
            None => Ok(0),
        }
    }

    /// Deduct `cost` tokens for a paid feature invocation.
    ///
    /// Atomically (per user): checks the balance, writes the new balance,
    /// appends a usage record, and appends the matching `consume` entry. If
    /// either append fails after the balance write, the balance is restored
    /// before the error surfaces, so the balance is never decremented without
    /// its audit record.
    pub async fn consume(
        &self,
        user_id: Uuid,
        feature_id: &str,
        category: &str,
        cost: i64,
        external_units: Option<i64>,
    ) -> BillingResult<UsageRecord> {
        if cost <= 0 {
            return Err(BillingError::InvariantViolation(format!(
                "consume cost must be positive, got {cost}"
            )));
        }

        let _guard = self.locks.acquire(user_id).await;

        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;
        Self::check_balance_invariant(user_id, profile.tokens)?;

        let balance_before = profile.tokens;
        if balance_before < cost {
            return Err(BillingError::InsufficientBalance {
                required: cost,
                current: balance_before,
            });
        }
        let balance_after = balance_before - cost;

        self.apply_balance(user_id, balance_before, balance_after)
            .await?;

        let usage = match self
            .log
            .append_usage(NewUsageRecord {
                user_id,
                feature_id: feature_id.to_string(),
                category: category.to_string(),
                tokens_consumed: cost,
                external_units,
            })
            .await
        {
            Ok(usage) => usage,
            Err(err) => {
                self.roll_back_balance(user_id, balance_after, balance_before)
                    .await?;
                return Err(err);
            }
        };

        if let Err(err) = self
            .log
            .append_entry(NewLedgerEntry {
                user_id,
                entry_type: LedgerEntryType::Consume,
                amount: -cost,
                balance_before,
                balance_after,
                transaction_id: None,
                usage_id: Some(usage.id),
                description: format!("Used {cost} tokens for {feature_id}"),
            })
            .await
        {
            self.roll_back_balance(user_id, balance_after, balance_before)
                .await?;
            return Err(err);
        }

        tracing::info!(
            user_id = %user_id,
            feature_id = %feature_id,
            cost = cost,
            balance_after = balance_after,
            "Consumed tokens"
        );

        Ok(usage)
    }

    /// Credit tokens from a purchase or a plan bonus.
    pub async fn add(
        &self,
        user_id: Uuid,
        amount: i64,
        kind: CreditKind,
        transaction_id: Option<Uuid>,
        description: &str,
    ) -> BillingResult<()> {
        if amount <= 0 {
            return Err(BillingError::InvariantViolation(format!(
                "credit amount must be positive, got {amount}"
            )));
        }

        let _guard = self.locks.acquire(user_id).await;

        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;
        Self::check_balance_invariant(user_id, profile.tokens)?;

        let balance_before = profile.tokens;
        let balance_after = balance_before + amount;

        self.apply_balance(user_id, balance_before, balance_after)
            .await?;

        if let Err(err) = self
            .log
            .append_entry(NewLedgerEntry {
                user_id,
                entry_type: kind.into(),
                amount,
                balance_before,
                balance_after,
                transaction_id,
                usage_id: None,
                description: description.to_string(),
            })
            .await
        {
            self.roll_back_balance(user_id, balance_after, balance_before)
                .await?;
            return Err(err);
        }

        tracing::info!(
            user_id = %user_id,
            amount = amount,
            kind = ?kind,
            balance_after = balance_after,
            "Credited tokens"
        );

        Ok(())
    }

    /// Compensating credit tied to a specific usage record, for a feature
    /// that failed after tokens were consumed. Returns false for an unknown
    /// user.
    pub async fn refund(
        &self,
        user_id: Uuid,
        usage_id: Uuid,
        amount: i64,
        reason: &str,
    ) -> BillingResult<bool> {
        if amount <= 0 {
            return Err(BillingError::InvariantViolation(format!(
                "refund amount must be positive, got {amount}"
            )));
        }

        let _guard = self.locks.acquire(user_id).await;

        let Some(profile) = self.profiles.profile(user_id).await? else {
            return Ok(false);
        };
        Self::check_balance_invariant(user_id, profile.tokens)?;

        let balance_before = profile.tokens;
        let balance_after = balance_before + amount;

        self.apply_balance(user_id, balance_before, balance_after)
            .await?;

        if let Err(err) = self
            .log
            .append_entry(NewLedgerEntry {
                user_id,
                entry_type: LedgerEntryType::Refund,
                amount,
                balance_before,
                balance_after,
                transaction_id: None,
                usage_id: Some(usage_id),
                description: reason.to_string(),
            })
            .await
        {
            self.roll_back_balance(user_id, balance_after, balance_before)
                .await?;
            return Err(err);
        }

        tracing::info!(
            user_id = %user_id,
            usage_id = %usage_id,
            amount = amount,
            "Refunded tokens"
        );

        Ok(true)
    }

    /// Most recent ledger entries for an account
    pub async fn history(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<LedgerEntry>> {
        self.log.entries(user_id, limit).await
    }

    /// Most recent usage records for an account
    pub async fn usage_history(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<UsageRecord>> {
        self.log.usage(user_id, limit).await
    }

    async fn apply_balance(&self, user_id: Uuid, expected: i64, new: i64) -> BillingResult<()> {
        let applied = self.profiles.swap_balance(user_id, expected, new).await?;
        if !applied {
            // The per-user lock rules out in-process races, so a failed swap
            // means another process moved the balance; retryable
            return Err(BillingError::StoreUnavailable(format!(
                "concurrent balance modification for user {user_id}"
            )));
        }
        Ok(())
    }

    async fn roll_back_balance(
        &self,
        user_id: Uuid,
        current: i64,
        original: i64,
    ) -> BillingResult<()> {
        let restored = self
            .profiles
            .swap_balance(user_id, current, original)
            .await
            .unwrap_or(false);
        if !restored {
            tracing::error!(
                user_id = %user_id,
                current = current,
                original = original,
                "Failed to roll back balance after audit write failure"
            );
            return Err(BillingError::InvariantViolation(format!(
                "balance rollback failed for user {user_id}; balance decremented without audit record"
            )));
        }
        Ok(())
    }

    fn check_balance_invariant(user_id: Uuid, tokens: i64) -> BillingResult<()> {
        if tokens < 0 {
            return Err(BillingError::InvariantViolation(format!(
                "negative balance {tokens} for user {user_id}"
            )));
        }
        Ok(())
    }
}
