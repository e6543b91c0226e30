use std::sync::Arc;

use log::*;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::SettlementFlowApi,
    db_types::{LogEvent, PaymentStatusEvent},
    traits::{LedgerError, SettlementDatabase, SettlementError},
    workers::{RetryPolicy, WorkerConfig},
};

/// What the worker should do with the event after one call to [`dispatch_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    /// Processed (or deliberately skipped); advance the offset.
    Commit,
    /// Transient failure survived the whole retry schedule. The offset stays put and the worker stops
    /// polling this partition; a manual rewind (or a restart) redelivers from here.
    Park,
    /// Shutdown interrupted processing. The offset stays put; the event is redelivered on restart.
    Abandon,
}

/// Starts the status dispatcher pool: `config.workers` tasks draining the payment-status topic as one
/// consumer group, with partitions assigned round-robin. Do not await the handles before signalling
/// `shutdown`; the workers run until told to stop.
pub fn start_status_dispatcher<B>(
    api: Arc<SettlementFlowApi<B>>,
    config: &WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    B: SettlementDatabase + Send + Sync + 'static,
{
    let partition_count = api.db().partition_count();
    let workers = config.workers.max(1);
    (0..workers)
        .map(|idx| {
            let partitions = (0..partition_count).filter(|p| p % workers == idx).collect::<Vec<u32>>();
            let api = Arc::clone(&api);
            let config = config.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_worker(api, idx, partitions, config, shutdown).await;
            })
        })
        .collect()
}

async fn run_worker<B>(
    api: Arc<SettlementFlowApi<B>>,
    idx: u32,
    mut partitions: Vec<u32>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    B: SettlementDatabase + Send + Sync + 'static,
{
    let group = api.topics().consumer_group.clone();
    let topic = api.topics().status_topic.clone();
    info!("🔄️ Status dispatch worker {idx} started. Partitions: {partitions:?}");
    loop {
        if *shutdown.borrow() {
            break;
        }
        if partitions.is_empty() {
            warn!("🔄️ Status dispatch worker {idx} has no partitions left to poll and is going idle");
            let _ = shutdown.changed().await;
            break;
        }
        let event = match api.db().next_event(&group, &topic, &partitions).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                idle_wait(config.poll_interval, &mut shutdown).await;
                continue;
            },
            Err(e) => {
                error!("🔄️ Status dispatch worker {idx} could not poll the log: {e}");
                idle_wait(config.poll_interval, &mut shutdown).await;
                continue;
            },
        };
        match dispatch_one(&api, &event, &config.retry, &mut shutdown).await {
            EventDisposition::Commit => {
                if let Err(e) = api.db().commit_event(&group, &event).await {
                    error!("🔄️ Could not commit offset for seq {} on {topic}/{}: {e}", event.seq, event.partition_id);
                }
            },
            EventDisposition::Park => {
                partitions.retain(|p| i64::from(*p) != event.partition_id);
                error!(
                    "🔄️ Partition {} of {topic} parked at seq {}. Rewind the {group} offset to replay it.",
                    event.partition_id, event.seq
                );
            },
            EventDisposition::Abandon => {},
        }
    }
    info!("🔄️ Status dispatch worker {idx} stopped");
}

/// Process one status event off the log, retrying transient failures per `retry`. Extracted from the worker
/// loop so that the retry and skip semantics can be exercised without spinning up the pool.
pub async fn dispatch_one<B>(
    api: &SettlementFlowApi<B>,
    event: &LogEvent,
    retry: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> EventDisposition
where
    B: SettlementDatabase,
{
    let status_event = match event.decode::<PaymentStatusEvent>() {
        Ok(ev) => ev,
        Err(e) => {
            error!("🔄️ Undecodable payload at seq {} on partition {}: {e}. Skipping.", event.seq, event.partition_id);
            return EventDisposition::Commit;
        },
    };
    let mut attempt = 0u32;
    loop {
        match api.process_status_event(&status_event).await {
            Ok(outcome) => {
                if outcome.was_applied() {
                    info!(
                        "🔄️ Transaction [{}] moved to {}",
                        status_event.transaction_id,
                        outcome.transaction().status
                    );
                } else {
                    debug!(
                        "🔄️ Redelivered event for [{}] → {} absorbed",
                        status_event.transaction_id, status_event.target_status
                    );
                }
                return EventDisposition::Commit;
            },
            Err(e) if e.is_transient() => {
                if attempt >= retry.max_retries() {
                    let err = SettlementError::ExhaustedRetries {
                        transaction_id: status_event.transaction_id.clone(),
                        attempts: attempt + 1,
                        last_error: e.to_string(),
                    };
                    error!("🔄️ {err}");
                    return EventDisposition::Park;
                }
                let delay = retry.delay_for(attempt);
                attempt += 1;
                warn!(
                    "🔄️ Transient failure on [{}] → {}: {e}. Retry {attempt} in {delay:?}",
                    status_event.transaction_id, status_event.target_status
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = shutdown.changed() => return EventDisposition::Abandon,
                }
            },
            Err(SettlementError::Ledger(LedgerError::InsufficientFunds { .. })) => {
                // A wallet that cannot honour a settlement will not start honouring it on retry. Fail the
                // transaction so the merchant finds out, and let reconciliation flag the wallet.
                warn!(
                    "🔄️ Insufficient funds settling [{}]; marking the transaction FAILED",
                    status_event.transaction_id
                );
                match api.fail_transaction(&status_event.transaction_id).await {
                    Ok(_) => return EventDisposition::Commit,
                    Err(e) => {
                        error!("🔄️ Could not fail transaction [{}]: {e}", status_event.transaction_id);
                        return EventDisposition::Park;
                    },
                }
            },
            Err(e) => {
                error!(
                    "🔄️ Rejected status event for [{}] → {}: {e}. Skipping.",
                    status_event.transaction_id, status_event.target_status
                );
                return EventDisposition::Commit;
            },
        }
    }
}

async fn idle_wait(poll_interval: std::time::Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => {},
        _ = shutdown.changed() => {},
    }
}
