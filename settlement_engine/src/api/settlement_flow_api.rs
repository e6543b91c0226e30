use std::fmt::Debug;

use log::*;

use crate::{
    api::TopicConfig,
    db_types::{LogEvent, NewStatusOverride, PaymentStatusEvent, TransactionId, TransactionStatus},
    events::{EventProducers, TransactionSettledEvent},
    traits::{
        GatewayCallback,
        ProcessorError,
        ProcessorRegistry,
        SettlementDatabase,
        SettlementError,
        SettlementOutcome,
    },
};

/// Overrides rewrite history; a one-word justification is not an audit trail.
pub const MIN_JUSTIFICATION_LEN: usize = 10;

/// `SettlementFlowApi` is the primary API for moving payment-status information through the system: from
/// gateway callback, through the durable status log, into the atomic ledger-plus-status settlement, and on
/// to the webhook delivery queue.
pub struct SettlementFlowApi<B> {
    db: B,
    producers: EventProducers,
    registry: ProcessorRegistry,
    topics: TopicConfig,
}

impl<B> Debug for SettlementFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementFlowApi")
    }
}

impl<B> SettlementFlowApi<B> {
    pub fn new(db: B, producers: EventProducers, registry: ProcessorRegistry, topics: TopicConfig) -> Self {
        Self { db, producers, registry, topics }
    }

    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }
}

impl<B> SettlementFlowApi<B>
where B: SettlementDatabase
{
    /// Append a normalized status event to the durable status log. This is the producer side of the
    /// pipeline; one event is appended per gateway callback.
    pub async fn submit_status_event(&self, event: PaymentStatusEvent) -> Result<LogEvent, SettlementError> {
        let payload = serde_json::to_string(&event).map_err(|e| SettlementError::TransientInfra(e.to_string()))?;
        let appended =
            self.db.append_event(&self.topics.status_topic, event.transaction_id.as_str(), payload).await?;
        debug!(
            "🔄️💰️ Status event for [{}] → {} appended at seq {}",
            event.transaction_id, event.target_status, appended.seq
        );
        Ok(appended)
    }

    /// Ingest a raw gateway callback: resolve the medium's processor, let it translate the callback into a
    /// normalized status event, and append that event to the status log. The engine never inspects the
    /// gateway's wire format.
    pub async fn ingest_gateway_callback(&self, callback: GatewayCallback) -> Result<LogEvent, SettlementError> {
        let processor = self
            .registry
            .get(callback.medium)
            .ok_or_else(|| SettlementError::ProcessorNotFound(callback.medium.to_string()))?;
        let event = processor.settle_payment(&callback).await.map_err(|e| match e {
            ProcessorError::MalformedCallback(msg) => SettlementError::MalformedEvent(msg),
            ProcessorError::GatewayUnreachable(msg) => SettlementError::TransientInfra(msg),
            other => SettlementError::Processor(other.to_string()),
        })?;
        trace!("🔄️💰️ Gateway callback for [{}] normalised via {}", event.transaction_id, callback.medium);
        self.submit_status_event(event).await
    }

    /// Apply a status event to the transaction and the wallet ledger in one atomic unit, enqueueing a
    /// webhook delivery event if the transaction settles. Redelivered events are absorbed as no-ops; illegal
    /// transitions are rejected with zero side effects.
    pub async fn process_status_event(
        &self,
        event: &PaymentStatusEvent,
    ) -> Result<SettlementOutcome, SettlementError> {
        let outcome = self.db.apply_status_event(event, &self.topics.webhook_topic).await?;
        self.call_settled_hook(&outcome).await;
        Ok(outcome)
    }

    /// Mark a transaction as failed. Used when settlement hits a permanent error (e.g. insufficient funds on
    /// an inconsistent wallet): the transaction fails rather than retrying forever.
    pub async fn fail_transaction(&self, id: &TransactionId) -> Result<SettlementOutcome, SettlementError> {
        let event = PaymentStatusEvent::new(id.clone(), TransactionStatus::Failed);
        self.process_status_event(&event).await
    }

    /// Apply an administrative status override, bypassing the dispatcher but not the atomic
    /// ledger-plus-status unit. Requires a justification of at least [`MIN_JUSTIFICATION_LEN`] characters
    /// and the acting admin's identity; both land in the audit trail. Re-applying an override that matches
    /// the current status is a no-op.
    pub async fn apply_override(&self, ovr: NewStatusOverride) -> Result<SettlementOutcome, SettlementError> {
        let len = ovr.justification.trim().len();
        if len < MIN_JUSTIFICATION_LEN {
            return Err(SettlementError::JustificationTooShort { len, min: MIN_JUSTIFICATION_LEN });
        }
        let outcome = self.db.apply_status_override(&ovr, &self.topics.webhook_topic).await?;
        self.call_settled_hook(&outcome).await;
        Ok(outcome)
    }

    async fn call_settled_hook(&self, outcome: &SettlementOutcome) {
        if let SettlementOutcome::Applied { transaction, previous_status, .. } = outcome {
            if !transaction.status.is_terminal() {
                return;
            }
            for emitter in &self.producers.transaction_settled_producer {
                trace!("🔄️📦️ Notifying transaction-settled hook subscribers");
                let event = TransactionSettledEvent::new(transaction.clone(), *previous_status);
                emitter.publish_event(event).await;
            }
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
