use mpg_common::Money;
use thiserror::Error;

use crate::db_types::{Wallet, WalletOwnerType};

/// The four wallet ledger operations, plus the read paths the health check needs.
///
/// Every operation is a single atomic unit against the owning wallet row(s). Concurrency safety comes from
/// per-row atomicity at the storage layer (guarded UPDATEs, row-exclusive transactions) and **not** from
/// in-process locks, because worker pools may run across multiple processes.
#[allow(async_fn_in_trait)]
pub trait WalletLedger {
    /// Fetch a wallet by owner. Returns `None` if no wallet exists for the owner.
    async fn fetch_wallet(&self, owner_type: WalletOwnerType, owner_id: &str) -> Result<Option<Wallet>, LedgerError>;

    /// Fetch the singleton platform admin wallet.
    async fn fetch_admin_wallet(&self) -> Result<Wallet, LedgerError>;

    /// Fetch every wallet. Used by the reconciliation sweep.
    async fn fetch_all_wallets(&self) -> Result<Vec<Wallet>, LedgerError>;

    /// Fetch the wallet for the given owner, creating an empty one if it does not exist. Idempotent.
    async fn fetch_or_create_wallet(
        &self,
        owner_type: WalletOwnerType,
        owner_id: &str,
        currency: &str,
    ) -> Result<Wallet, LedgerError>;

    /// Reserve `amount` for an in-flight withdrawal: `available -= amount; locked += amount`.
    ///
    /// Fails with [`LedgerError::InsufficientFunds`] unless `available >= amount`. The check and the
    /// decrement are one storage operation, so no caller can observe a partially-applied state under
    /// concurrent callers on the same wallet.
    async fn lock_withdrawal(&self, merchant_id: &str, amount: Money) -> Result<Wallet, LedgerError>;

    /// Finalize a successful withdrawal: `locked -= amount` on the merchant wallet (available was already
    /// debited by the lock), `available += commission` on the admin wallet. Both mutations commit in one
    /// atomic unit, touching the two rows in ascending wallet-id order.
    async fn settle_withdrawal_success(
        &self,
        merchant_id: &str,
        amount: Money,
        commission: Money,
    ) -> Result<Wallet, LedgerError>;

    /// Roll back a failed withdrawal: `available += amount; locked -= amount`. A full refund of the lock,
    /// in one atomic unit.
    async fn settle_withdrawal_failure(&self, merchant_id: &str, amount: Money) -> Result<Wallet, LedgerError>;

    /// Finalize a successful deposit: `available += amount` on the merchant wallet, `available += commission`
    /// on the admin wallet, in one atomic unit. Deposit failure has no ledger effect (no lock was taken).
    async fn settle_deposit_success(
        &self,
        merchant_id: &str,
        amount: Money,
        commission: Money,
    ) -> Result<Wallet, LedgerError>;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Insufficient funds for {merchant_id}: requested {requested}, available {available}")]
    InsufficientFunds { merchant_id: String, requested: Money, available: Money },
    #[error("No wallet exists for {owner_type} {owner_id}")]
    WalletNotFound { owner_type: String, owner_id: String },
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::DatabaseError(e.to_string())
    }
}
