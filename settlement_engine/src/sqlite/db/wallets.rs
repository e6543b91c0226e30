use log::debug;
use mpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Wallet, WalletOwnerType, ADMIN_WALLET_OWNER_ID},
    traits::LedgerError,
};

pub async fn fetch_wallet(
    owner_type: WalletOwnerType,
    owner_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE owner_type = $1 AND owner_id = $2")
        .bind(owner_type)
        .bind(owner_id)
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

pub async fn fetch_admin_wallet(conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    fetch_wallet(WalletOwnerType::Admin, ADMIN_WALLET_OWNER_ID, conn).await?.ok_or_else(|| {
        LedgerError::WalletNotFound {
            owner_type: WalletOwnerType::Admin.to_string(),
            owner_id: ADMIN_WALLET_OWNER_ID.to_string(),
        }
    })
}

pub async fn fetch_all(conn: &mut SqliteConnection) -> Result<Vec<Wallet>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM wallets ORDER BY id").fetch_all(conn).await
}

/// Fetches the wallet for the given owner, creating an empty one if it does not exist. Idempotent.
pub async fn fetch_or_create(
    owner_type: WalletOwnerType,
    owner_id: &str,
    currency: &str,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    if let Some(wallet) = fetch_wallet(owner_type, owner_id, &mut *conn).await? {
        return Ok(wallet);
    }
    let wallet: Wallet = sqlx::query_as(
        "INSERT INTO wallets (owner_type, owner_id, currency) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(owner_type)
    .bind(owner_id)
    .bind(currency)
    .fetch_one(conn)
    .await?;
    debug!("🏦️ Created {owner_type} wallet #{} for {owner_id}", wallet.id);
    Ok(wallet)
}

/// Reserves `amount` for an in-flight withdrawal. The balance check and the decrement are a single guarded
/// UPDATE, so concurrent callers on the same wallet can never observe a partially-applied state.
pub async fn lock_withdrawal(
    merchant_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let updated: Option<Wallet> = sqlx::query_as(
        r#"
        UPDATE wallets SET
            available_amount = available_amount - $1,
            locked_amount = locked_amount + $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE owner_type = 'Merchant' AND owner_id = $2 AND available_amount >= $1
        RETURNING *"#,
    )
    .bind(amount)
    .bind(merchant_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(wallet) => Ok(wallet),
        None => {
            let wallet = require_merchant_wallet(merchant_id, conn).await?;
            Err(LedgerError::InsufficientFunds {
                merchant_id: merchant_id.to_string(),
                requested: amount,
                available: wallet.available_amount,
            })
        },
    }
}

/// Finalizes a successful withdrawal. The merchant's lock is released without touching `available` (that was
/// debited when the lock was taken) and the platform commission lands in the admin wallet. The two rows are
/// touched in ascending wallet-id order so that concurrent settlements touching the same pair from different
/// directions cannot deadlock.
pub async fn settle_withdrawal_success(
    merchant_id: &str,
    amount: Money,
    commission: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let merchant = require_merchant_wallet(merchant_id, &mut *conn).await?;
    let admin = fetch_admin_wallet(&mut *conn).await?;
    let mut ops = [(merchant.id, WalletOp::DebitLocked(amount)), (admin.id, WalletOp::CreditAvailable(commission))];
    ops.sort_by_key(|(id, _)| *id);
    for (wallet_id, op) in ops {
        apply_op(wallet_id, op, &mut *conn).await?;
    }
    debug!("🏦️ Withdrawal of {amount} settled for merchant {merchant_id}; commission {commission}");
    require_merchant_wallet(merchant_id, conn).await
}

/// Rolls a failed withdrawal back: the locked amount returns to `available` in full, in one guarded UPDATE.
pub async fn settle_withdrawal_failure(
    merchant_id: &str,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let updated: Option<Wallet> = sqlx::query_as(
        r#"
        UPDATE wallets SET
            available_amount = available_amount + $1,
            locked_amount = locked_amount - $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE owner_type = 'Merchant' AND owner_id = $2 AND locked_amount >= $1
        RETURNING *"#,
    )
    .bind(amount)
    .bind(merchant_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(wallet) => Ok(wallet),
        None => {
            let wallet = require_merchant_wallet(merchant_id, conn).await?;
            Err(LedgerError::InsufficientFunds {
                merchant_id: merchant_id.to_string(),
                requested: amount,
                available: wallet.locked_amount,
            })
        },
    }
}

/// Finalizes a successful deposit: merchant and admin wallets are credited in ascending wallet-id order.
pub async fn settle_deposit_success(
    merchant_id: &str,
    amount: Money,
    commission: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let merchant = require_merchant_wallet(merchant_id, &mut *conn).await?;
    let admin = fetch_admin_wallet(&mut *conn).await?;
    let mut ops = [(merchant.id, WalletOp::CreditAvailable(amount)), (admin.id, WalletOp::CreditAvailable(commission))];
    ops.sort_by_key(|(id, _)| *id);
    for (wallet_id, op) in ops {
        apply_op(wallet_id, op, &mut *conn).await?;
    }
    debug!("🏦️ Deposit of {amount} settled for merchant {merchant_id}; commission {commission}");
    require_merchant_wallet(merchant_id, conn).await
}

/// Reverses a settled deposit for a refund: the merchant gives back the credited amount and the admin wallet
/// gives back the commission. Both debits are guarded, so a refund that would drive either balance negative
/// fails with `InsufficientFunds` and rolls back.
pub async fn reverse_deposit_success(
    merchant_id: &str,
    amount: Money,
    commission: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let merchant = require_merchant_wallet(merchant_id, &mut *conn).await?;
    let admin = fetch_admin_wallet(&mut *conn).await?;
    let mut ops = [(merchant.id, WalletOp::DebitAvailable(amount)), (admin.id, WalletOp::DebitAvailable(commission))];
    ops.sort_by_key(|(id, _)| *id);
    for (wallet_id, op) in ops {
        apply_op(wallet_id, op, &mut *conn).await?;
    }
    require_merchant_wallet(merchant_id, conn).await
}

/// Reverses a settled withdrawal for a refund: the merchant regains the withdrawn amount and the admin wallet
/// gives back the commission.
pub async fn reverse_withdrawal_success(
    merchant_id: &str,
    amount: Money,
    commission: Money,
    conn: &mut SqliteConnection,
) -> Result<Wallet, LedgerError> {
    let merchant = require_merchant_wallet(merchant_id, &mut *conn).await?;
    let admin = fetch_admin_wallet(&mut *conn).await?;
    let mut ops = [(merchant.id, WalletOp::CreditAvailable(amount)), (admin.id, WalletOp::DebitAvailable(commission))];
    ops.sort_by_key(|(id, _)| *id);
    for (wallet_id, op) in ops {
        apply_op(wallet_id, op, &mut *conn).await?;
    }
    require_merchant_wallet(merchant_id, conn).await
}

#[derive(Debug, Clone, Copy)]
enum WalletOp {
    CreditAvailable(Money),
    DebitAvailable(Money),
    DebitLocked(Money),
}

async fn apply_op(wallet_id: i64, op: WalletOp, conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let (sql, amount) = match op {
        WalletOp::CreditAvailable(amount) => (
            "UPDATE wallets SET available_amount = available_amount + $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $2 RETURNING id",
            amount,
        ),
        WalletOp::DebitAvailable(amount) => (
            "UPDATE wallets SET available_amount = available_amount - $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $2 AND available_amount >= $1 RETURNING id",
            amount,
        ),
        WalletOp::DebitLocked(amount) => (
            "UPDATE wallets SET locked_amount = locked_amount - $1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = $2 AND locked_amount >= $1 RETURNING id",
            amount,
        ),
    };
    let updated: Option<(i64,)> = sqlx::query_as(sql).bind(amount).bind(wallet_id).fetch_optional(&mut *conn).await?;
    if updated.is_none() {
        let wallet: Option<Wallet> =
            sqlx::query_as("SELECT * FROM wallets WHERE id = $1").bind(wallet_id).fetch_optional(conn).await?;
        return match wallet {
            Some(w) => Err(LedgerError::InsufficientFunds {
                merchant_id: w.owner_id,
                requested: amount,
                available: match op {
                    WalletOp::DebitLocked(_) => w.locked_amount,
                    _ => w.available_amount,
                },
            }),
            None => Err(LedgerError::WalletNotFound {
                owner_type: "unknown".to_string(),
                owner_id: wallet_id.to_string(),
            }),
        };
    }
    Ok(())
}

async fn require_merchant_wallet(merchant_id: &str, conn: &mut SqliteConnection) -> Result<Wallet, LedgerError> {
    fetch_wallet(WalletOwnerType::Merchant, merchant_id, conn).await?.ok_or_else(|| LedgerError::WalletNotFound {
        owner_type: WalletOwnerType::Merchant.to_string(),
        owner_id: merchant_id.to_string(),
    })
}
