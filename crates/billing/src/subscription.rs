//! Subscription Lifecycle
//!
//! Premium status is derived from the stored expiry timestamp. Deactivation
//! is lazy: the first status read after expiry clears the premium fields.
//! There is no background scheduler.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use quanta_shared::{catalog, PremiumPlan, Profile};

use crate::error::{BillingError, BillingResult};
use crate::locks::LockMap;
use crate::store::{PremiumUpdate, ProfileStore};

/// Resolved (expiry-checked) premium status
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    pub active: bool,
    pub plan: Option<PremiumPlan>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub days_remaining: i64,
}

impl SubscriptionStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            plan: None,
            expires_at: None,
            days_remaining: 0,
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionLifecycle {
    profiles: Arc<dyn ProfileStore>,
    locks: Arc<LockMap<Uuid>>,
}

impl SubscriptionLifecycle {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            locks: Arc::new(LockMap::new()),
        }
    }

    /// Resolve the current premium status.
    ///
    /// If the stored flag is set but the expiry has passed, this call clears
    /// the premium fields and reports inactive. This is the only path that
    /// deactivates an expired subscription.
    pub async fn resolve_status(&self, user_id: Uuid) -> BillingResult<SubscriptionStatus> {
        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;

        match Self::status_of(user_id, &profile)? {
            Some(status) => Ok(status),
            None => self.deactivate_if_expired(user_id).await,
        }
    }

    /// Deactivate an apparently expired subscription.
    ///
    /// Re-reads the profile under the user lock before writing: the first
    /// read ran unlocked, and a renewal settling in between must not be
    /// wiped by a deactivation based on that stale snapshot.
    async fn deactivate_if_expired(&self, user_id: Uuid) -> BillingResult<SubscriptionStatus> {
        let _guard = self.locks.acquire(user_id).await;

        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;

        if let Some(status) = Self::status_of(user_id, &profile)? {
            return Ok(status);
        }

        self.profiles
            .set_premium(user_id, PremiumUpdate::deactivated())
            .await?;
        tracing::info!(
            user_id = %user_id,
            "Deactivated expired premium subscription"
        );
        Ok(SubscriptionStatus::inactive())
    }

    /// Status from a profile snapshot; `None` means the subscription looks
    /// expired and needs the locked deactivation path
    fn status_of(user_id: Uuid, profile: &Profile) -> BillingResult<Option<SubscriptionStatus>> {
        if !profile.is_premium {
            return Ok(Some(SubscriptionStatus::inactive()));
        }

        let Some(expires_at) = profile.premium_expires_at else {
            return Err(BillingError::InvariantViolation(format!(
                "premium account {user_id} has no expiry timestamp"
            )));
        };

        let now = OffsetDateTime::now_utc();
        if expires_at <= now {
            return Ok(None);
        }

        Ok(Some(SubscriptionStatus {
            active: true,
            plan: profile.premium_plan,
            expires_at: Some(expires_at),
            days_remaining: days_until(now, expires_at),
        }))
    }

    /// Activate or renew premium for `plan`.
    ///
    /// A renewal on an active subscription extends from the current expiry,
    /// not from now, so remaining paid time is never lost.
    pub async fn extend(&self, user_id: Uuid, plan: PremiumPlan) -> BillingResult<()> {
        let _guard = self.locks.acquire(user_id).await;

        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;

        let now = OffsetDateTime::now_utc();
        let current = if profile.is_premium {
            profile.premium_expires_at
        } else {
            None
        };
        let expires_at = extended_expiry(now, current, catalog::plan(plan).period);

        self.profiles
            .set_premium(
                user_id,
                PremiumUpdate {
                    is_premium: true,
                    plan: Some(plan),
                    expires_at: Some(expires_at),
                },
            )
            .await?;

        tracing::info!(
            user_id = %user_id,
            plan = %plan,
            expires_at = %expires_at,
            "Extended premium subscription"
        );

        Ok(())
    }
}

/// New expiry after a plan purchase: `max(now, current) + period`
fn extended_expiry(
    now: OffsetDateTime,
    current: Option<OffsetDateTime>,
    period: Duration,
) -> OffsetDateTime {
    let base = match current {
        Some(expiry) if expiry > now => expiry,
        _ => now,
    };
    base + period
}

/// Whole days until expiry, rounded up; a partial day still counts
fn days_until(now: OffsetDateTime, expiry: OffsetDateTime) -> i64 {
    const SECONDS_PER_DAY: i64 = 86_400;
    let seconds = (expiry - now).whole_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}
