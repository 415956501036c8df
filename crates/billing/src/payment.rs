//! Payment Reconciler
//!
//! Opens payment transactions against the gateway and consumes its
//! asynchronous settlement notifications. Notifications are duplicated,
//! delayed, and reordered by the gateway; the reconciler converts them into
//! at-most-once ledger credits and subscription extensions.
//!
//! Per transaction the state machine is `pending -> completed` or
//! `pending -> failed`, both terminal. The terminal check and the status
//! write run inside one per-order critical section, and the settlement side
//! effect is applied before the status write: a crash in between leaves the
//! transaction `pending`, and the next (duplicate) notification retries it.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use quanta_shared::{catalog, PremiumPlan, TransactionKind, TransactionStatus};

use crate::error::{BillingError, BillingResult};
use crate::gateway::{PaymentGateway, SessionRequest};
use crate::ledger::{CreditKind, TokenLedger};
use crate::locks::LockMap;
use crate::signature::verify_signature;
use crate::store::{NewPaymentTransaction, ProfileStore, TransactionStore};
use crate::subscription::SubscriptionLifecycle;

/// A purchase request; pricing is resolved from the catalog, never from the
/// client
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub kind: TransactionKind,
    /// Plan key (`monthly`/`yearly`) or token package key
    pub item: String,
}

/// Result of opening a payment: hand the token to the payer-facing client
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPayment {
    pub order_id: String,
    pub gateway_token: String,
    pub redirect_url: String,
}

/// Inbound settlement notification payload
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationPayload {
    pub order_id: String,
    pub transaction_status: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub fraud_status: Option<String>,
}

/// What a notification did to the transaction
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub order_id: String,
    pub status: TransactionStatus,
}

/// Classification of a gateway transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Accepted,
    Rejected,
    /// Intermediate or unrecognized status; no transition
    Pending,
}

pub struct PaymentReconciler {
    transactions: Arc<dyn TransactionStore>,
    profiles: Arc<dyn ProfileStore>,
    ledger: TokenLedger,
    subscriptions: SubscriptionLifecycle,
    gateway: Arc<dyn PaymentGateway>,
    server_key: String,
    order_locks: LockMap<String>,
}

impl PaymentReconciler {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        profiles: Arc<dyn ProfileStore>,
        ledger: TokenLedger,
        subscriptions: SubscriptionLifecycle,
        gateway: Arc<dyn PaymentGateway>,
        server_key: String,
    ) -> Self {
        Self {
            transactions,
            profiles,
            ledger,
            subscriptions,
            gateway,
            server_key,
            order_locks: LockMap::new(),
        }
    }

    /// Open a payment: persist a `pending` transaction, then obtain a hosted
    /// checkout session from the gateway.
    ///
    /// If the gateway call fails the transaction stays `pending` and the
    /// caller may retry with a fresh order.
    pub async fn create_payment(
        &self,
        user_id: Uuid,
        request: PaymentRequest,
    ) -> BillingResult<CreatedPayment> {
        let (gross_amount, tokens_amount, item_name) = resolve_item(&request)?;
        let order_id = generate_order_id(match request.kind {
            TransactionKind::Subscription => "SUB",
            TransactionKind::Tokens => "TOKEN",
        });

        let profile = self
            .profiles
            .profile(user_id)
            .await?
            .ok_or(BillingError::ProfileNotFound(user_id))?;

        let txn = self
            .transactions
            .insert(NewPaymentTransaction {
                user_id,
                order_id: order_id.clone(),
                kind: request.kind,
                item: request.item.clone(),
                gross_amount,
                tokens_amount,
            })
            .await?;

        let session = self
            .gateway
            .create_session(&SessionRequest {
                order_id: order_id.clone(),
                gross_amount,
                item_id: request.item.clone(),
                item_name: item_name.to_string(),
                customer_email: profile.email.clone(),
                customer_name: profile.full_name.unwrap_or_else(|| "User".to_string()),
            })
            .await?;

        self.transactions
            .set_gateway_token(&order_id, &session.token)
            .await?;

        tracing::info!(
            user_id = %user_id,
            order_id = %order_id,
            kind = %request.kind,
            item = %request.item,
            gross_amount = gross_amount,
            "Created payment transaction"
        );

        Ok(CreatedPayment {
            order_id: txn.order_id,
            gateway_token: session.token,
            redirect_url: session.redirect_url,
        })
    }

    /// Consume a settlement notification, idempotently.
    ///
    /// Signature verification is the sole authentication for this
    /// unauthenticated inbound path. A notification for a transaction
    /// already in a terminal state re-reports that status without applying
    /// any credit.
    pub async fn handle_notification(
        &self,
        notification: NotificationPayload,
    ) -> BillingResult<NotificationOutcome> {
        if !verify_signature(
            &notification.signature_key,
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        ) {
            tracing::warn!(
                order_id = %notification.order_id,
                "Rejected notification with invalid signature"
            );
            return Err(BillingError::InvalidSignature);
        }

        // Terminal check and status write share this critical section so
        // concurrent duplicate deliveries cannot double-credit
        let _guard = self.order_locks.acquire(notification.order_id.clone()).await;

        let txn = self
            .transactions
            .by_order_id(&notification.order_id)
            .await?
            .ok_or_else(|| BillingError::UnknownTransaction {
                order_id: notification.order_id.clone(),
            })?;

        if txn.status.is_terminal() {
            tracing::info!(
                order_id = %txn.order_id,
                status = %txn.status,
                "Replayed notification for settled transaction; no-op"
            );
            return Ok(NotificationOutcome {
                order_id: txn.order_id,
                status: txn.status,
            });
        }

        match classify(
            &notification.transaction_status,
            notification.fraud_status.as_deref(),
        ) {
            Settlement::Accepted => {
                // Side effect first; a crash before the status write leaves
                // the transaction pending for safe re-processing
                self.apply_settlement(&txn).await?;
                let completed_at = OffsetDateTime::now_utc();
                self.transactions
                    .finalize(&txn.order_id, TransactionStatus::Completed, Some(completed_at))
                    .await?;
                tracing::info!(
                    order_id = %txn.order_id,
                    user_id = %txn.user_id,
                    "Payment settled"
                );
                Ok(NotificationOutcome {
                    order_id: txn.order_id,
                    status: TransactionStatus::Completed,
                })
            }
            Settlement::Rejected => {
                self.transactions
                    .finalize(&txn.order_id, TransactionStatus::Failed, None)
                    .await?;
                tracing::info!(
                    order_id = %txn.order_id,
                    gateway_status = %notification.transaction_status,
                    "Payment failed"
                );
                Ok(NotificationOutcome {
                    order_id: txn.order_id,
                    status: TransactionStatus::Failed,
                })
            }
            Settlement::Pending => {
                tracing::debug!(
                    order_id = %txn.order_id,
                    gateway_status = %notification.transaction_status,
                    "Intermediate notification; no transition"
                );
                Ok(NotificationOutcome {
                    order_id: txn.order_id,
                    status: TransactionStatus::Pending,
                })
            }
        }
    }

    /// Look up a transaction for the status endpoint
    pub async fn transaction(
        &self,
        order_id: &str,
    ) -> BillingResult<quanta_shared::PaymentTransaction> {
        self.transactions
            .by_order_id(order_id)
            .await?
            .ok_or_else(|| BillingError::UnknownTransaction {
                order_id: order_id.to_string(),
            })
    }

    /// Apply exactly one settlement side effect for an accepted payment
    async fn apply_settlement(
        &self,
        txn: &quanta_shared::PaymentTransaction,
    ) -> BillingResult<()> {
        match txn.kind {
            TransactionKind::Subscription => {
                let plan: PremiumPlan = txn
                    .item
                    .parse()
                    .map_err(|_| BillingError::UnknownItem(txn.item.clone()))?;
                let plan_config = catalog::plan(plan);

                self.subscriptions.extend(txn.user_id, plan).await?;
                self.ledger
                    .add(
                        txn.user_id,
                        plan_config.bonus_tokens,
                        CreditKind::Bonus,
                        Some(txn.id),
                        &format!("Bonus tokens from {} subscription", plan_config.name),
                    )
                    .await
            }
            TransactionKind::Tokens => {
                let package = catalog::package(&txn.item)
                    .ok_or_else(|| BillingError::UnknownItem(txn.item.clone()))?;

                self.ledger
                    .add(
                        txn.user_id,
                        package.amount,
                        CreditKind::Purchase,
                        Some(txn.id),
                        &format!("Purchased {}", package.name),
                    )
                    .await
            }
        }
    }
}

/// Resolve gross amount, token amount, and display name from the catalog
fn resolve_item(request: &PaymentRequest) -> BillingResult<(i64, Option<i64>, &'static str)> {
    match request.kind {
        TransactionKind::Subscription => {
            let plan: PremiumPlan = request
                .item
                .parse()
                .map_err(|_| BillingError::UnknownItem(request.item.clone()))?;
            let config = catalog::plan(plan);
            Ok((config.price, Some(config.bonus_tokens), config.name))
        }
        TransactionKind::Tokens => {
            let package = catalog::package(&request.item)
                .ok_or_else(|| BillingError::UnknownItem(request.item.clone()))?;
            Ok((package.price, Some(package.amount), package.name))
        }
    }
}

/// Map a gateway transaction status to a settlement decision.
///
/// Captured/settled payments count only when not flagged by fraud review;
/// anything unrecognized stays pending.
fn classify(transaction_status: &str, fraud_status: Option<&str>) -> Settlement {
    match transaction_status {
        "capture" | "settlement" => match fraud_status {
            None | Some("accept") => Settlement::Accepted,
            Some(_) => Settlement::Pending,
        },
        "cancel" | "deny" | "expire" => Settlement::Rejected,
        _ => Settlement::Pending,
    }
}

/// Globally unique order id: prefix, millisecond timestamp, random suffix
fn generate_order_id(prefix: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", prefix, millis, suffix.to_uppercase())
}
