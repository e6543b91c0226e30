use crate::{
    db_types::{CallbackLogEntry, NewCallbackAttempt, TransactionId},
    traits::SettlementError,
};

/// Append-only audit trail of webhook delivery attempts. One row per attempt, success or failure; rows are
/// never mutated or deleted.
#[allow(async_fn_in_trait)]
pub trait CallbackAudit {
    fn record_callback_attempt(
        &self,
        attempt: NewCallbackAttempt,
    ) -> impl std::future::Future<Output = Result<CallbackLogEntry, SettlementError>> + Send;

    async fn callback_attempts_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<CallbackLogEntry>, SettlementError>;
}
