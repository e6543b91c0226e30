use thiserror::Error;

use crate::{
    db_types::{NewStatusOverride, PaymentStatusEvent, Transaction, TransactionId, TransactionStatus},
    traits::{CallbackAudit, EventLog, LedgerError, TransactionStore, WalletLedger},
};

/// The outcome of applying a status event or override.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The transition was applied. `webhook_enqueued` is true when the transaction reached a terminal status
    /// and a delivery event was appended in the same database transaction.
    Applied { transaction: Transaction, previous_status: TransactionStatus, webhook_enqueued: bool },
    /// The stored status was already at or past the target. Redeliveries land here; nothing was changed and
    /// no webhook was enqueued.
    AlreadyApplied { transaction: Transaction },
}

impl SettlementOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            SettlementOutcome::Applied { transaction, .. } => transaction,
            SettlementOutcome::AlreadyApplied { transaction } => transaction,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, SettlementOutcome::Applied { .. })
    }
}

/// The highest-level contract for settlement-engine backends: the per-concern storage traits, plus the two
/// compound operations whose parts must commit or roll back together.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + WalletLedger + TransactionStore + EventLog + CallbackAudit {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Apply a payment status event in one atomic unit:
    /// * compare-and-swap the transaction status (a stored status at or past the target makes this a no-op),
    /// * execute the matching wallet ledger mutation,
    /// * enqueue a webhook delivery event on `webhook_topic` if the transaction reached a terminal status.
    ///
    /// An illegal transition rolls back with [`SettlementError::IllegalTransition`] and zero side effects.
    /// `REFUNDED` targets are rejected here; they are reserved for [`Self::apply_status_override`].
    fn apply_status_event(
        &self,
        event: &PaymentStatusEvent,
        webhook_topic: &str,
    ) -> impl std::future::Future<Output = Result<SettlementOutcome, SettlementError>> + Send;

    /// Apply an administrative override: the same atomic ledger-plus-status unit as
    /// [`Self::apply_status_event`], plus an audit row recording the acting admin and their justification.
    /// Idempotent: an override matching the current status is a no-op (and writes no audit row).
    async fn apply_status_override(
        &self,
        ovr: &NewStatusOverride,
        webhook_topic: &str,
    ) -> Result<SettlementOutcome, SettlementError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Transient infrastructure failure: {0}")]
    TransientInfra(String),
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
    #[error("Illegal status transition {from} → {to} for transaction {transaction_id}")]
    IllegalTransition { transaction_id: TransactionId, from: TransactionStatus, to: TransactionStatus },
    #[error("The requested transaction {0} does not exist")]
    TransactionNotFound(TransactionId),
    #[error("{0}")]
    Ledger(LedgerError),
    #[error("No payment processor is registered for medium {0}")]
    ProcessorNotFound(String),
    #[error("Payment processor error: {0}")]
    Processor(String),
    #[error("Override justification too short: {len} characters, minimum is {min}")]
    JustificationTooShort { len: usize, min: usize },
    #[error("Retries exhausted after {attempts} attempts for transaction {transaction_id}: {last_error}")]
    ExhaustedRetries { transaction_id: TransactionId, attempts: u32, last_error: String },
}

impl SettlementError {
    /// Whether the retry policy applies. Validation failures and permanent ledger errors never retry;
    /// infrastructure failures do.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettlementError::TransientInfra(_) | SettlementError::Ledger(LedgerError::DatabaseError(_))
        )
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::TransientInfra(e.to_string())
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DatabaseError(msg) => SettlementError::TransientInfra(msg),
            other => SettlementError::Ledger(other),
        }
    }
}

impl From<serde_json::Error> for SettlementError {
    fn from(e: serde_json::Error) -> Self {
        SettlementError::MalformedEvent(e.to_string())
    }
}
