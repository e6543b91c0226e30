//! The settlement engine public API.
//!
//! [`SettlementFlowApi`] is the write path: it feeds gateway callbacks into the status log, applies status
//! events to the ledger, and handles administrative overrides. [`ReconciliationApi`] is the read-only health
//! check. Both are generic over [`crate::traits::SettlementDatabase`] and take their collaborators by
//! constructor injection so tests can substitute fakes.
mod reconciliation_api;
mod settlement_flow_api;

pub use reconciliation_api::{LedgerReport, ReconciliationApi};
pub use settlement_flow_api::{SettlementFlowApi, MIN_JUSTIFICATION_LEN};

/// Names of the two durable topics and the consumer group draining them.
#[derive(Debug, Clone)]
pub struct TopicConfig {
    pub status_topic: String,
    pub webhook_topic: String,
    pub consumer_group: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            status_topic: "payment-status".to_string(),
            webhook_topic: "webhook-delivery".to_string(),
            consumer_group: "settlement-core".to_string(),
        }
    }
}
