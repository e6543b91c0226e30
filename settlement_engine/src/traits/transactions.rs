use mpg_common::Money;

use crate::{
    db_types::{NewTransaction, Transaction, TransactionId},
    traits::SettlementError,
};

/// Persistence for transaction records.
///
/// Status transitions are deliberately absent here: the stored status only ever changes inside
/// [`super::SettlementDatabase::apply_status_event`] or
/// [`super::SettlementDatabase::apply_status_override`], where the compare-and-swap commits together with
/// the matching ledger mutation.
#[allow(async_fn_in_trait)]
pub trait TransactionStore {
    /// Insert a new transaction record. Idempotent: returns the existing record and `false` if a transaction
    /// with the same id already exists.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<(Transaction, bool), SettlementError>;

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, SettlementError>;

    /// The transaction-derived expectation for a merchant wallet:
    /// `Σ merchant_net (successful deposits) − Σ amount (successful withdrawals)`.
    /// Refunded transactions contribute zero (their ledger effect was reversed).
    async fn merchant_settled_net(&self, merchant_id: &str) -> Result<Money, SettlementError>;

    /// The transaction-derived expectation for the admin wallet: `Σ admin_net` over successful transactions.
    async fn admin_settled_net(&self) -> Result<Money, SettlementError>;
}
