//! Background worker pools.
//!
//! Two pools drain the durable log: the status dispatcher applies payment-status events to the ledger, and
//! the webhook sender POSTs delivery events to merchant endpoints. Both run as consumer groups with
//! partitions divided round-robin among workers, so per-transaction ordering is preserved while unrelated
//! transactions settle in parallel.
mod dispatcher;
mod retry;
mod webhook_sender;

use std::time::Duration;

pub use dispatcher::{dispatch_one, start_status_dispatcher, EventDisposition};
pub use retry::{RetryPolicy, RetryPolicyError};
pub use webhook_sender::{
    deliver_one,
    start_webhook_senders,
    CallbackResponse,
    CallbackTransport,
    DeliveryOutcome,
    HttpCallbackTransport,
};

/// Sizing and retry settings for a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker tasks in the pool. More workers than partitions leaves the surplus idle.
    pub workers: u32,
    /// How long an idle worker waits before polling its partitions again.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { workers: 4, poll_interval: Duration::from_millis(500), retry: RetryPolicy::default() }
    }
}
