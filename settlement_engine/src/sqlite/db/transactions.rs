use log::debug;
use mpg_common::Money;
use sqlx::SqliteConnection;

use crate::db_types::{NewTransaction, Transaction, TransactionId, TransactionStatus};

/// Inserts the transaction into the database, returning `false` in the second parameter if it already exists.
pub async fn idempotent_insert(
    tx: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, bool), sqlx::Error> {
    let inserted = match fetch_by_id(&tx.id, &mut *conn).await? {
        Some(existing) => (existing, false),
        None => {
            let tx = insert(tx, conn).await?;
            debug!("📝️ Transaction [{}] inserted for merchant {}", tx.id, tx.merchant_id);
            (tx, true)
        },
    };
    Ok(inserted)
}

async fn insert(tx: NewTransaction, conn: &mut SqliteConnection) -> Result<Transaction, sqlx::Error> {
    let record = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                id,
                merchant_id,
                tx_type,
                medium,
                amount,
                fee,
                vat,
                total_amount,
                admin_net,
                merchant_net,
                reference,
                callback_url
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(tx.id)
    .bind(tx.merchant_id)
    .bind(tx.tx_type)
    .bind(tx.medium)
    .bind(tx.amount)
    .bind(tx.fee)
    .bind(tx.vat)
    .bind(tx.total_amount)
    .bind(tx.admin_net)
    .bind(tx.merchant_net)
    .bind(tx.reference)
    .bind(tx.callback_url)
    .fetch_one(conn)
    .await?;
    Ok(record)
}

pub async fn fetch_by_id(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let tx = sqlx::query_as("SELECT * FROM transactions WHERE id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(tx)
}

/// Compare-and-swap on the stored status. Returns `None` when the stored status no longer matches `from`,
/// which means a concurrent writer got there first; callers must treat that as a lost race, not an error in
/// the data.
pub async fn update_status_cas(
    id: &TransactionId,
    from: TransactionStatus,
    to: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let updated = sqlx::query_as(
        "UPDATE transactions SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to)
    .bind(id.as_str())
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// The net ledger effect of the merchant's settled history: successful deposits credit `merchant_net`,
/// successful withdrawals debit `amount`. Refunded transactions contribute zero because their ledger effect
/// was reversed.
pub async fn merchant_settled_net(merchant_id: &str, conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let net: i64 = sqlx::query_scalar(
        r#"
        SELECT CAST(COALESCE(SUM(
            CASE
                WHEN tx_type = 'Deposit' THEN merchant_net
                WHEN tx_type = 'Withdrawal' THEN -amount
                ELSE 0
            END), 0) AS INTEGER)
        FROM transactions
        WHERE merchant_id = $1 AND status = 'SUCCESS'"#,
    )
    .bind(merchant_id)
    .fetch_one(conn)
    .await?;
    Ok(Money::from(net))
}

/// The commission the admin wallet should hold: `Σ admin_net` over all successful transactions.
pub async fn admin_settled_net(conn: &mut SqliteConnection) -> Result<Money, sqlx::Error> {
    let net: i64 = sqlx::query_scalar(
        "SELECT CAST(COALESCE(SUM(admin_net), 0) AS INTEGER) FROM transactions WHERE status = 'SUCCESS'",
    )
    .fetch_one(conn)
    .await?;
    Ok(Money::from(net))
}
