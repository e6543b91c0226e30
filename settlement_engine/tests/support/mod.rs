pub mod prepare_env;

use mpg_common::{Money, DEFAULT_CURRENCY_CODE};
use settlement_engine::{
    db_types::{NewTransaction, PaymentMedium, Transaction, TransactionId, TransactionType, WalletOwnerType},
    events::EventProducers,
    traits::{ProcessorRegistry, SettlementDatabase, TransactionStore, WalletLedger},
    SettlementFlowApi,
    SqliteDatabase,
    TopicConfig,
};

use crate::support::prepare_env::{prepare_test_env, random_db_path};

pub const PARTITIONS: u32 = 4;

pub async fn setup() -> SettlementFlowApi<SqliteDatabase> {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5, PARTITIONS).await.expect("Error creating database");
    SettlementFlowApi::new(db, EventProducers::default(), ProcessorRegistry::new(), TopicConfig::default())
}

pub async fn tear_down(mut api: SettlementFlowApi<SqliteDatabase>) {
    let url = api.db().url().to_string();
    if let Err(e) = api.db_mut().close().await {
        log::error!("🚀️ Failed to close database: {e}");
    }
    use sqlx::migrate::MigrateDatabase;
    sqlx::Sqlite::drop_database(&url).await.expect("Error dropping database");
}

/// Creates a merchant wallet and an INITIATED deposit of `amount` with a `fee + vat` commission split.
pub async fn new_deposit(
    db: &SqliteDatabase,
    id: &str,
    merchant_id: &str,
    amount: i64,
    fee: i64,
    vat: i64,
) -> Transaction {
    db.fetch_or_create_wallet(WalletOwnerType::Merchant, merchant_id, DEFAULT_CURRENCY_CODE)
        .await
        .expect("Error creating wallet");
    let tx = NewTransaction::new(
        TransactionId(id.to_string()),
        merchant_id.to_string(),
        TransactionType::Deposit,
        PaymentMedium::Card,
        Money::from(amount),
        format!("https://{merchant_id}.example.com/webhooks"),
    )
    .with_commission(Money::from(fee), Money::from(vat));
    let (tx, created) = db.insert_transaction(tx).await.expect("Error inserting transaction");
    assert!(created);
    tx
}

/// Creates a merchant wallet holding `available`, takes the withdrawal lock for `amount`, and records the
/// matching INITIATED withdrawal.
pub async fn new_withdrawal(
    db: &SqliteDatabase,
    id: &str,
    merchant_id: &str,
    available: i64,
    amount: i64,
    fee: i64,
) -> Transaction {
    seed_merchant_wallet(db, merchant_id, available).await;
    db.lock_withdrawal(merchant_id, Money::from(amount)).await.expect("Error locking withdrawal");
    let tx = NewTransaction::new(
        TransactionId(id.to_string()),
        merchant_id.to_string(),
        TransactionType::Withdrawal,
        PaymentMedium::BankTransfer,
        Money::from(amount),
        format!("https://{merchant_id}.example.com/webhooks"),
    )
    .with_commission(Money::from(fee), Money::zero());
    let (tx, created) = db.insert_transaction(tx).await.expect("Error inserting transaction");
    assert!(created);
    tx
}

/// Creates a merchant wallet and gives it `available` spendable funds directly.
pub async fn seed_merchant_wallet(db: &SqliteDatabase, merchant_id: &str, available: i64) {
    let wallet = db
        .fetch_or_create_wallet(WalletOwnerType::Merchant, merchant_id, DEFAULT_CURRENCY_CODE)
        .await
        .expect("Error creating wallet");
    sqlx::query("UPDATE wallets SET available_amount = $1 WHERE id = $2")
        .bind(Money::from(available))
        .bind(wallet.id)
        .execute(db.pool())
        .await
        .expect("Error seeding wallet");
}

pub async fn merchant_wallet(db: &SqliteDatabase, merchant_id: &str) -> settlement_engine::db_types::Wallet {
    db.fetch_wallet(WalletOwnerType::Merchant, merchant_id)
        .await
        .expect("Error fetching wallet")
        .expect("Merchant wallet missing")
}
