//! Common types used across Quanta

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Error returned when a stored enum string does not match any known variant
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

// =============================================================================
// Account / Profile
// =============================================================================

/// Premium subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PremiumPlan {
    Monthly,
    Yearly,
}

impl std::fmt::Display for PremiumPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PremiumPlan::Monthly => write!(f, "monthly"),
            PremiumPlan::Yearly => write!(f, "yearly"),
        }
    }
}

impl FromStr for PremiumPlan {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PremiumPlan::Monthly),
            "yearly" => Ok(PremiumPlan::Yearly),
            other => Err(ParseEnumError {
                kind: "premium plan",
                value: other.to_string(),
            }),
        }
    }
}

/// One balance/subscription record per user.
///
/// `tokens` is mutated only through the Token Ledger; the premium fields only
/// through the Subscription Lifecycle. Invariants: `tokens >= 0`, and
/// `is_premium == true` implies `premium_expires_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub tokens: i64,
    pub is_premium: bool,
    pub premium_plan: Option<PremiumPlan>,
    pub premium_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Ledger
// =============================================================================

/// Kind of balance movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    Purchase,
    Bonus,
    Consume,
    Refund,
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Purchase => write!(f, "purchase"),
            LedgerEntryType::Bonus => write!(f, "bonus"),
            LedgerEntryType::Consume => write!(f, "consume"),
            LedgerEntryType::Refund => write!(f, "refund"),
        }
    }
}

impl FromStr for LedgerEntryType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(LedgerEntryType::Purchase),
            "bonus" => Ok(LedgerEntryType::Bonus),
            "consume" => Ok(LedgerEntryType::Consume),
            "refund" => Ok(LedgerEntryType::Refund),
            other => Err(ParseEnumError {
                kind: "ledger entry type",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable audit record of one balance change.
///
/// Invariant: `balance_after == balance_before + amount`. Entries ordered by
/// creation time reconstruct every historical balance for the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Signed amount; negative for `consume`
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub transaction_id: Option<Uuid>,
    pub usage_id: Option<Uuid>,
    pub description: String,
    pub created_at: OffsetDateTime,
}

/// One record per successfully executed paid feature invocation, linked 1:1
/// to the `consume` ledger entry that funded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feature_id: String,
    pub category: String,
    pub tokens_consumed: i64,
    /// Upstream model usage units, when the feature reports them
    pub external_units: Option<i64>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Payments
// =============================================================================

/// What a payment transaction purchases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Subscription,
    Tokens,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Subscription => write!(f, "subscription"),
            TransactionKind::Tokens => write!(f, "tokens"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscription" => Ok(TransactionKind::Subscription),
            "tokens" => Ok(TransactionKind::Tokens),
            other => Err(ParseEnumError {
                kind: "transaction kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Settlement state of a payment transaction.
///
/// Transitions only `pending -> completed` or `pending -> failed`; both are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ParseEnumError {
                kind: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// One record per purchase attempt, keyed by a globally unique order id.
///
/// Credits the ledger at most once regardless of how many gateway
/// notifications reference its `order_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    pub kind: TransactionKind,
    /// Plan or package key from the catalog
    pub item: String,
    pub gross_amount: i64,
    pub tokens_amount: Option<i64>,
    pub status: TransactionStatus,
    pub gateway_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

// =============================================================================
// Row decoding
// =============================================================================

fn decode_enum<T: FromStr<Err = ParseEnumError>>(
    column: &'static str,
    raw: String,
) -> Result<T, sqlx::Error> {
    raw.parse().map_err(|e: ParseEnumError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for Profile {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let plan: Option<String> = row.try_get("premium_plan")?;
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            full_name: row.try_get("full_name")?,
            tokens: row.try_get("tokens")?,
            is_premium: row.try_get("is_premium")?,
            premium_plan: plan
                .map(|p| decode_enum("premium_plan", p))
                .transpose()?,
            premium_expires_at: row.try_get("premium_expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for LedgerEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let entry_type: String = row.try_get("entry_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            entry_type: decode_enum("entry_type", entry_type)?,
            amount: row.try_get("amount")?,
            balance_before: row.try_get("balance_before")?,
            balance_after: row.try_get("balance_after")?,
            transaction_id: row.try_get("transaction_id")?,
            usage_id: row.try_get("usage_id")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UsageRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            feature_id: row.try_get("feature_id")?,
            category: row.try_get("category")?,
            tokens_consumed: row.try_get("tokens_consumed")?,
            external_units: row.try_get("external_units")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for PaymentTransaction {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        let kind: String = row.try_get("kind")?;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            order_id: row.try_get("order_id")?,
            kind: decode_enum("kind", kind)?,
            item: row.try_get("item")?,
            gross_amount: row.try_get("gross_amount")?,
            tokens_amount: row.try_get("tokens_amount")?,
            status: decode_enum("status", status)?,
            gateway_token: row.try_get("gateway_token")?,
            created_at: row.try_get("created_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_entry_type_round_trip() {
        for (s, t) in [
            ("purchase", LedgerEntryType::Purchase),
            ("bonus", LedgerEntryType::Bonus),
            ("consume", LedgerEntryType::Consume),
            ("refund", LedgerEntryType::Refund),
        ] {
            assert_eq!(s.parse::<LedgerEntryType>().unwrap(), t);
            assert_eq!(t.to_string(), s);
        }
        assert!("credit".parse::<LedgerEntryType>().is_err());
    }

    #[test]
    fn test_transaction_status_terminality() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_premium_plan_display() {
        assert_eq!(PremiumPlan::Monthly.to_string(), "monthly");
        assert_eq!("yearly".parse::<PremiumPlan>().unwrap(), PremiumPlan::Yearly);
    }
}
