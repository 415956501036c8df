//! Token ledger integration tests
//!
//! Every balance change must pair with exactly one audit entry, the entry
//! log must replay to the current balance, and the balance must never go
//! negative.

#![allow(clippy::unwrap_used)]

mod common;

use common::{core, profile};
use quanta_billing::{BillingError, CreditKind};
use quanta_shared::LedgerEntryType;
use uuid::Uuid;

#[tokio::test]
async fn consume_deducts_and_writes_audit_pair() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    let usage = t
        .ledger
        .consume(user, "prompt-enhancer", "daily-tools", 3, Some(420))
        .await
        .unwrap();
    assert_eq!(usage.tokens_consumed, 3);
    assert_eq!(usage.external_units, Some(420));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 2);

    let entries = t.ledger.history(user, 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_type, LedgerEntryType::Consume);
    assert_eq!(entries[0].amount, -3);
    assert_eq!(entries[0].balance_before, 5);
    assert_eq!(entries[0].balance_after, 2);
    assert_eq!(entries[0].usage_id, Some(usage.id));
}

#[tokio::test]
async fn consume_beyond_balance_leaves_state_unchanged() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    t.ledger
        .consume(user, "prompt-enhancer", "daily-tools", 3, None)
        .await
        .unwrap();

    let err = t
        .ledger
        .consume(user, "prompt-enhancer", "daily-tools", 3, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::InsufficientBalance {
            required: 3,
            current: 2
        }
    ));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 2);
    assert_eq!(t.ledger.history(user, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ledger_replay_reconstructs_balance() {
    let t = core();
    let p = profile(10);
    let user = p.id;
    t.store.insert_profile(p);

    t.ledger
        .add(user, 50, CreditKind::Purchase, None, "Purchased 50 Tokens")
        .await
        .unwrap();
    let usage = t
        .ledger
        .consume(user, "interview-simulation", "career", 3, None)
        .await
        .unwrap();
    t.ledger
        .consume(user, "swot-self-analysis", "career", 2, None)
        .await
        .unwrap();
    t.ledger
        .refund(user, usage.id, 3, "feature failed after charge")
        .await
        .unwrap();
    t.ledger
        .add(user, 30, CreditKind::Bonus, None, "Subscription bonus")
        .await
        .unwrap();

    let balance = t.ledger.balance(user).await.unwrap();
    assert_eq!(balance, 10 + 50 - 3 - 2 + 3 + 30);

    // Oldest-first, the chain of entries must replay the balance exactly
    let mut entries = t.ledger.history(user, 50).await.unwrap();
    entries.reverse();
    let mut replayed = 10;
    for entry in &entries {
        assert_eq!(entry.balance_before, replayed);
        assert_eq!(entry.balance_after, entry.balance_before + entry.amount);
        assert!(entry.balance_after >= 0);
        replayed = entry.balance_after;
    }
    assert_eq!(replayed, balance);
}

#[tokio::test]
async fn failed_usage_write_rolls_back_balance() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    t.store.inject_usage_failures(1);
    let err = t
        .ledger
        .consume(user, "prompt-enhancer", "daily-tools", 3, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StoreUnavailable(_)));

    // Balance restored, no dangling audit state
    assert_eq!(t.ledger.balance(user).await.unwrap(), 5);
    assert_eq!(t.store.entry_count(), 0);

    // The ledger works again afterwards
    t.ledger
        .consume(user, "prompt-enhancer", "daily-tools", 3, None)
        .await
        .unwrap();
    assert_eq!(t.ledger.balance(user).await.unwrap(), 2);
}

#[tokio::test]
async fn failed_entry_write_rolls_back_credit() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    t.store.inject_entry_failures(1);
    let err = t
        .ledger
        .add(user, 10, CreditKind::Purchase, None, "Purchased 10 Tokens")
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::StoreUnavailable(_)));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 5);
}

#[tokio::test]
async fn refund_credits_against_usage() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    let usage = t
        .ledger
        .consume(user, "application-essay", "writing", 2, None)
        .await
        .unwrap();
    let refunded = t
        .ledger
        .refund(user, usage.id, 2, "generation failed")
        .await
        .unwrap();
    assert!(refunded);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 5);

    let entries = t.ledger.history(user, 10).await.unwrap();
    assert_eq!(entries[0].entry_type, LedgerEntryType::Refund);
    assert_eq!(entries[0].usage_id, Some(usage.id));
}

#[tokio::test]
async fn refund_for_unknown_user_is_false() {
    let t = core();
    let refunded = t
        .ledger
        .refund(Uuid::new_v4(), Uuid::new_v4(), 2, "noop")
        .await
        .unwrap();
    assert!(!refunded);
}

#[tokio::test]
async fn balance_of_unknown_user_is_zero() {
    let t = core();
    assert_eq!(t.ledger.balance(Uuid::new_v4()).await.unwrap(), 0);
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    assert!(matches!(
        t.ledger
            .add(user, 0, CreditKind::Purchase, None, "zero")
            .await
            .unwrap_err(),
        BillingError::InvariantViolation(_)
    ));
    assert!(matches!(
        t.ledger
            .consume(user, "prompt-enhancer", "daily-tools", -1, None)
            .await
            .unwrap_err(),
        BillingError::InvariantViolation(_)
    ));
    assert_eq!(t.ledger.balance(user).await.unwrap(), 5);
}

#[tokio::test]
async fn concurrent_consumes_never_overdraw() {
    let t = core();
    let p = profile(5);
    let user = p.id;
    t.store.insert_profile(p);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = t.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .consume(user, "prompt-enhancer", "daily-tools", 1, None)
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(BillingError::InsufficientBalance { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(insufficient, 5);
    assert_eq!(t.ledger.balance(user).await.unwrap(), 0);
    assert_eq!(t.ledger.history(user, 20).await.unwrap().len(), 5);
}
