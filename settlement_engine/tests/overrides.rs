//! Administrative status overrides: justification rules, the refund reversal, and the audit trail.
mod support;

use mpg_common::Money;
use settlement_engine::{
    db_types::{NewStatusOverride, PaymentStatusEvent, TransactionId, TransactionStatus},
    traits::{SettlementError, TransactionStore, WalletLedger},
    SettlementFlowApi,
    SqliteDatabase,
    MIN_JUSTIFICATION_LEN,
};

use crate::support::{merchant_wallet, new_deposit, setup, tear_down};

fn override_for(id: &TransactionId, status: TransactionStatus, justification: &str) -> NewStatusOverride {
    NewStatusOverride {
        transaction_id: id.clone(),
        admin_id: "ops-jane".to_string(),
        new_status: status,
        justification: justification.to_string(),
    }
}

async fn settled_deposit(api: &SettlementFlowApi<SqliteDatabase>, id: &str) -> TransactionId {
    let tx = new_deposit(api.db(), id, "acme", 10_000, 200, 50).await;
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Pending)).await.unwrap();
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Success)).await.unwrap();
    tx.id
}

#[tokio::test]
async fn short_justifications_are_rejected() {
    let api = setup().await;
    let id = settled_deposit(&api, "dep-3001").await;
    let err = api.apply_override(override_for(&id, TransactionStatus::Refunded, "oops")).await.unwrap_err();
    match err {
        SettlementError::JustificationTooShort { len, min } => {
            assert_eq!(len, 4);
            assert_eq!(min, MIN_JUSTIFICATION_LEN);
        },
        other => panic!("Expected JustificationTooShort, got {other}"),
    }
    // nothing changed
    let stored = api.db().fetch_transaction(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
    assert!(api.db().overrides_for_transaction(&id).await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn refund_reverses_a_settled_deposit_and_leaves_an_audit_row() {
    let api = setup().await;
    let id = settled_deposit(&api, "dep-3002").await;
    assert_eq!(merchant_wallet(api.db(), "acme").await.available_amount, Money::from(10_000));

    let ovr = override_for(&id, TransactionStatus::Refunded, "Customer chargeback per ticket 4511");
    let outcome = api.apply_override(ovr).await.unwrap();
    assert!(outcome.was_applied());
    assert_eq!(outcome.transaction().status, TransactionStatus::Refunded);

    // the SUCCESS ledger effect is undone on both sides
    assert_eq!(merchant_wallet(api.db(), "acme").await.available_amount, Money::zero());
    assert_eq!(api.db().fetch_admin_wallet().await.unwrap().available_amount, Money::zero());

    let trail = api.db().overrides_for_transaction(&id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].admin_id, "ops-jane");
    assert_eq!(trail[0].previous_status, TransactionStatus::Success);
    assert_eq!(trail[0].new_status, TransactionStatus::Refunded);
    assert_eq!(trail[0].justification, "Customer chargeback per ticket 4511");
    tear_down(api).await;
}

#[tokio::test]
async fn overrides_matching_the_current_status_are_noops() {
    let api = setup().await;
    let id = settled_deposit(&api, "dep-3003").await;
    let ovr = override_for(&id, TransactionStatus::Refunded, "Customer chargeback per ticket 4512");
    api.apply_override(ovr.clone()).await.unwrap();

    let outcome = api.apply_override(ovr).await.unwrap();
    assert!(!outcome.was_applied());
    // no second audit row and no second reversal
    assert_eq!(api.db().overrides_for_transaction(&id).await.unwrap().len(), 1);
    assert_eq!(merchant_wallet(api.db(), "acme").await.available_amount, Money::zero());
    tear_down(api).await;
}

#[tokio::test]
async fn illegal_overrides_are_rejected_without_an_audit_row() {
    let api = setup().await;
    let tx = new_deposit(api.db(), "dep-3004", "acme", 5_000, 0, 0).await;
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Pending)).await.unwrap();
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Failed)).await.unwrap();

    let ovr = override_for(&tx.id, TransactionStatus::Refunded, "Refund requested by merchant support");
    let err = api.apply_override(ovr).await.unwrap_err();
    assert!(matches!(err, SettlementError::IllegalTransition { .. }), "Expected IllegalTransition, got {err}");
    assert!(api.db().overrides_for_transaction(&tx.id).await.unwrap().is_empty());
    tear_down(api).await;
}

#[tokio::test]
async fn an_override_can_cancel_a_stuck_pending_transaction() {
    let api = setup().await;
    let tx = new_deposit(api.db(), "dep-3005", "acme", 5_000, 0, 0).await;
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Pending)).await.unwrap();

    let ovr = override_for(&tx.id, TransactionStatus::Canceled, "Gateway never responded; ticket 4620");
    let outcome = api.apply_override(ovr).await.unwrap();
    assert!(outcome.was_applied());
    assert_eq!(outcome.transaction().status, TransactionStatus::Canceled);
    // a canceled deposit moves no money
    assert_eq!(merchant_wallet(api.db(), "acme").await.available_amount, Money::zero());
    let trail = api.db().overrides_for_transaction(&tx.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].previous_status, TransactionStatus::Pending);
    tear_down(api).await;
}
