//! Wallet ledger operations, exercised directly against the SQLite backend.
mod support;

use mpg_common::{Money, DEFAULT_CURRENCY_CODE};
use settlement_engine::{
    db_types::{WalletOwnerType, ADMIN_WALLET_OWNER_ID},
    traits::{LedgerError, WalletLedger},
};

use crate::support::{merchant_wallet, seed_merchant_wallet, setup, tear_down};

#[tokio::test]
async fn admin_wallet_is_seeded_by_the_schema() {
    let api = setup().await;
    let admin = api.db().fetch_admin_wallet().await.expect("Error fetching admin wallet");
    assert_eq!(admin.owner_type, WalletOwnerType::Admin);
    assert_eq!(admin.owner_id, ADMIN_WALLET_OWNER_ID);
    assert_eq!(admin.available_amount, Money::zero());
    assert_eq!(admin.locked_amount, Money::zero());
    tear_down(api).await;
}

#[tokio::test]
async fn fetch_or_create_wallet_is_idempotent() {
    let api = setup().await;
    let db = api.db();
    let first = db.fetch_or_create_wallet(WalletOwnerType::Merchant, "acme", DEFAULT_CURRENCY_CODE).await.unwrap();
    let second = db.fetch_or_create_wallet(WalletOwnerType::Merchant, "acme", DEFAULT_CURRENCY_CODE).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.available_amount, Money::zero());
    assert_eq!(second.locked_amount, Money::zero());
    tear_down(api).await;
}

#[tokio::test]
async fn deposit_settlement_credits_merchant_and_admin() {
    let api = setup().await;
    let db = api.db();
    db.fetch_or_create_wallet(WalletOwnerType::Merchant, "acme", DEFAULT_CURRENCY_CODE).await.unwrap();
    db.settle_deposit_success("acme", Money::from(10_000), Money::from(250)).await.unwrap();
    let merchant = merchant_wallet(db, "acme").await;
    assert_eq!(merchant.available_amount, Money::from(10_000));
    assert_eq!(merchant.locked_amount, Money::zero());
    let admin = db.fetch_admin_wallet().await.unwrap();
    assert_eq!(admin.available_amount, Money::from(250));
    tear_down(api).await;
}

#[tokio::test]
async fn withdrawal_lock_moves_available_to_locked() {
    let api = setup().await;
    let db = api.db();
    seed_merchant_wallet(db, "acme", 10_000).await;
    let wallet = db.lock_withdrawal("acme", Money::from(4_000)).await.unwrap();
    assert_eq!(wallet.available_amount, Money::from(6_000));
    assert_eq!(wallet.locked_amount, Money::from(4_000));
    // the lock only moves money between the two columns
    assert_eq!(wallet.total(), Money::from(10_000));
    tear_down(api).await;
}

#[tokio::test]
async fn withdrawal_lock_with_insufficient_funds_is_rejected() {
    let api = setup().await;
    let db = api.db();
    seed_merchant_wallet(db, "acme", 1_000).await;
    let err = db.lock_withdrawal("acme", Money::from(5_000)).await.unwrap_err();
    match err {
        LedgerError::InsufficientFunds { merchant_id, requested, available } => {
            assert_eq!(merchant_id, "acme");
            assert_eq!(requested, Money::from(5_000));
            assert_eq!(available, Money::from(1_000));
        },
        other => panic!("Expected InsufficientFunds, got {other}"),
    }
    let wallet = merchant_wallet(db, "acme").await;
    assert_eq!(wallet.available_amount, Money::from(1_000));
    assert_eq!(wallet.locked_amount, Money::zero());
    tear_down(api).await;
}

#[tokio::test]
async fn failed_withdrawal_refunds_the_lock_in_full() {
    let api = setup().await;
    let db = api.db();
    seed_merchant_wallet(db, "acme", 10_000).await;
    db.lock_withdrawal("acme", Money::from(4_000)).await.unwrap();
    let wallet = db.settle_withdrawal_failure("acme", Money::from(4_000)).await.unwrap();
    assert_eq!(wallet.available_amount, Money::from(10_000));
    assert_eq!(wallet.locked_amount, Money::zero());
    tear_down(api).await;
}

#[tokio::test]
async fn successful_withdrawal_clears_the_lock_and_pays_commission() {
    let api = setup().await;
    let db = api.db();
    seed_merchant_wallet(db, "acme", 10_000).await;
    db.lock_withdrawal("acme", Money::from(4_000)).await.unwrap();
    let wallet = db.settle_withdrawal_success("acme", Money::from(4_000), Money::from(150)).await.unwrap();
    assert_eq!(wallet.available_amount, Money::from(6_000));
    assert_eq!(wallet.locked_amount, Money::zero());
    let admin = db.fetch_admin_wallet().await.unwrap();
    assert_eq!(admin.available_amount, Money::from(150));
    tear_down(api).await;
}

#[tokio::test]
async fn lock_for_unknown_merchant_reports_a_missing_wallet() {
    let api = setup().await;
    let err = api.db().lock_withdrawal("ghost", Money::from(100)).await.unwrap_err();
    assert!(matches!(err, LedgerError::WalletNotFound { .. }), "Expected WalletNotFound, got {err}");
    tear_down(api).await;
}

#[tokio::test]
async fn releasing_a_lock_that_was_never_taken_is_rejected() {
    let api = setup().await;
    let db = api.db();
    seed_merchant_wallet(db, "acme", 10_000).await;
    let err = db.settle_withdrawal_failure("acme", Money::from(4_000)).await.unwrap_err();
    match err {
        LedgerError::InsufficientFunds { requested, available, .. } => {
            assert_eq!(requested, Money::from(4_000));
            assert_eq!(available, Money::zero());
        },
        other => panic!("Expected InsufficientFunds, got {other}"),
    }
    tear_down(api).await;
}
