//! Payment reconciliation integration tests
//!
//! Notifications arrive duplicated and out of order; settlement must credit
//! the ledger exactly once per transaction.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use common::{core, core_with_gateway, profile, signed_notification, FailingGateway};
use quanta_billing::store::ProfileStore;
use quanta_billing::{BillingError, PaymentRequest};
use quanta_shared::{LedgerEntryType, TransactionKind, TransactionStatus};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn token_purchase_settles_once() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "medium".into(),
            },
        )
        .await
        .unwrap();
    assert!(created.order_id.starts_with("TOKEN-"));
    assert_eq!(created.gateway_token, format!("snap-{}", created.order_id));

    let outcome = t
        .reconciler
        .handle_notification(signed_notification(
            &created.order_id,
            "settlement",
            "1000",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Completed);

    assert_eq!(t.ledger.balance(user).await.unwrap(), 10);
    let entries = t.ledger.history(user, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, LedgerEntryType::Purchase);
    assert_eq!(entries[0].amount, 10);

    let txn = t.reconciler.transaction(&created.order_id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert!(txn.completed_at.is_some());
    assert_eq!(entries[0].transaction_id, Some(txn.id));
}

#[tokio::test]
async fn duplicate_notification_credits_exactly_once() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "large".into(),
            },
        )
        .await
        .unwrap();

    let notification = signed_notification(&created.order_id, "settlement", "4500", None);
    t.reconciler
        .handle_notification(notification.clone())
        .await
        .unwrap();
    let replay = t
        .reconciler
        .handle_notification(notification)
        .await
        .unwrap();

    // Replay re-reports the terminal status without a second credit
    assert_eq!(replay.status, TransactionStatus::Completed);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 50);
    assert_eq!(t.ledger.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn subscription_settlement_extends_premium_and_credits_bonus() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Subscription,
                item: "monthly".into(),
            },
        )
        .await
        .unwrap();
    assert!(created.order_id.starts_with("SUB-"));

    let before = OffsetDateTime::now_utc();
    let notification = signed_notification(&created.order_id, "settlement", "3900", None);
    let outcome = t
        .reconciler
        .handle_notification(notification.clone())
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Completed);

    let stored = t.store.profile(user).await.unwrap().unwrap();
    assert!(stored.is_premium);
    assert!(stored.premium_expires_at.unwrap() >= before + Duration::days(30));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 30);
    let entries = t.ledger.history(user, 10).await.unwrap();
    assert_eq!(entries[0].entry_type, LedgerEntryType::Bonus);

    // Second identical notification: status stays completed, no extra
    // credit, no second extension
    let replay = t
        .reconciler
        .handle_notification(notification)
        .await
        .unwrap();
    assert_eq!(replay.status, TransactionStatus::Completed);
    let after_replay = t.store.profile(user).await.unwrap().unwrap();
    assert_eq!(after_replay.premium_expires_at, stored.premium_expires_at);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 30);
}

#[tokio::test]
async fn failed_settlement_side_effect_leaves_pending_for_retry() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "medium".into(),
            },
        )
        .await
        .unwrap();
    let notification = signed_notification(&created.order_id, "settlement", "1000", None);

    // The credit's audit write fails; no status transition may happen
    t.store.inject_entry_failures(1);
    let err = t
        .reconciler
        .handle_notification(notification.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StoreUnavailable(_)));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);
    let txn = t.reconciler.transaction(&created.order_id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);

    // The gateway's redelivery settles it exactly once
    let outcome = t
        .reconciler
        .handle_notification(notification)
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Completed);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 10);
    assert_eq!(t.ledger.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tampered_amount_is_rejected_without_side_effects() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "xlarge".into(),
            },
        )
        .await
        .unwrap();

    // Signature was computed over the real amount; the payload claims another
    let mut notification = signed_notification(&created.order_id, "settlement", "8000", None);
    notification.gross_amount = "1".to_string();

    let err = t
        .reconciler
        .handle_notification(notification)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InvalidSignature));

    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);
    let txn = t.reconciler.transaction(&created.order_id).await.unwrap();
    assert_eq!(txn.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn rejected_payment_fails_terminally() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "small".into(),
            },
        )
        .await
        .unwrap();

    let outcome = t
        .reconciler
        .handle_notification(signed_notification(&created.order_id, "expire", "750", None))
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Failed);

    // A late out-of-order settlement for a failed transaction is a no-op
    let late = t
        .reconciler
        .handle_notification(signed_notification(
            &created.order_id,
            "settlement",
            "750",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(late.status, TransactionStatus::Failed);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);
}

#[tokio::test]
async fn intermediate_status_leaves_transaction_pending() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "small".into(),
            },
        )
        .await
        .unwrap();

    let outcome = t
        .reconciler
        .handle_notification(signed_notification(
            &created.order_id,
            "authorize",
            "750",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Pending);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);

    // The real settlement still lands afterwards
    let settled = t
        .reconciler
        .handle_notification(signed_notification(
            &created.order_id,
            "settlement",
            "750",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 5);
}

#[tokio::test]
async fn fraud_challenge_does_not_settle() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let created = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "small".into(),
            },
        )
        .await
        .unwrap();

    let outcome = t
        .reconciler
        .handle_notification(signed_notification(
            &created.order_id,
            "capture",
            "750",
            Some("challenge"),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.status, TransactionStatus::Pending);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_order_is_rejected() {
    let t = core();
    let err = t
        .reconciler
        .handle_notification(signed_notification("TOKEN-404-XXXXXXX", "settlement", "1000", None))
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::UnknownTransaction { .. }));
}

#[tokio::test]
async fn unknown_item_is_rejected_before_gateway_call() {
    let t = core();
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let err = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "mega".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::UnknownItem(_)));
}

#[tokio::test]
async fn gateway_outage_surfaces_as_retryable() {
    let t = core_with_gateway(Arc::new(FailingGateway));
    let p = profile(0);
    let user = p.id;
    t.store.insert_profile(p);

    let err = t
        .reconciler
        .create_payment(
            user,
            PaymentRequest {
                kind: TransactionKind::Tokens,
                item: "small".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::GatewayUnavailable(_)));
    assert!(err.is_retryable());
}
