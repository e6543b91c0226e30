use std::{collections::HashMap, sync::Arc};

use futures_util::future::BoxFuture;
use mpg_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{PaymentMedium, PaymentStatusEvent, TransactionId, TransactionStatus};

/// A payment or withdrawal initiation request, as seen by a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub transaction_id: TransactionId,
    pub merchant_id: String,
    pub amount: Money,
    pub currency: String,
    /// Medium-specific details (MSISDN, card token, bank account), opaque to the engine.
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub transaction_id: TransactionId,
    /// The provider-side reference for the initiated transaction.
    pub provider_reference: String,
    /// Where to send the customer, for media that redirect.
    pub redirect_url: Option<String>,
}

/// A raw callback received from a gateway. The engine never inspects `body`; only the medium's processor
/// understands the wire format.
#[derive(Debug, Clone)]
pub struct GatewayCallback {
    pub medium: PaymentMedium,
    pub body: String,
}

/// The contract every payment gateway integration implements, one per [`PaymentMedium`].
///
/// Methods return boxed futures rather than `async fn` so that processors can live behind `dyn` in the
/// registry; resolution is a plain map lookup, no runtime reflection.
pub trait PaymentProcessor: Send + Sync {
    fn medium(&self) -> PaymentMedium;

    fn initiate_payment<'a>(&'a self, req: &'a PaymentRequest) -> BoxFuture<'a, Result<PaymentResponse, ProcessorError>>;

    fn initiate_withdrawal<'a>(
        &'a self,
        req: &'a PaymentRequest,
    ) -> BoxFuture<'a, Result<PaymentResponse, ProcessorError>>;

    /// Translate a gateway callback into a normalized [`PaymentStatusEvent`]. This is the only way external
    /// status information enters the settlement pipeline.
    fn settle_payment<'a>(&'a self, callback: &'a GatewayCallback) -> BoxFuture<'a, Result<PaymentStatusEvent, ProcessorError>>;

    fn query_transaction_status<'a>(
        &'a self,
        id: &'a TransactionId,
    ) -> BoxFuture<'a, Result<TransactionStatus, ProcessorError>>;
}

#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("The gateway rejected the request ({status}): {message}")]
    GatewayRejection { status: u16, message: String },
    #[error("Could not reach the gateway: {0}")]
    GatewayUnreachable(String),
    #[error("Malformed gateway callback: {0}")]
    MalformedCallback(String),
    #[error("Operation not supported by this medium: {0}")]
    Unsupported(String),
}

/// Maps each payment medium to its processor. Built once at startup and injected wherever gateway callbacks
/// are ingested.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<PaymentMedium, Arc<dyn PaymentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn PaymentProcessor>) -> &mut Self {
        self.processors.insert(processor.medium(), processor);
        self
    }

    pub fn get(&self, medium: PaymentMedium) -> Option<Arc<dyn PaymentProcessor>> {
        self.processors.get(&medium).cloned()
    }

    pub fn media(&self) -> Vec<PaymentMedium> {
        self.processors.keys().copied().collect()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProcessorRegistry({:?})", self.media())
    }
}
