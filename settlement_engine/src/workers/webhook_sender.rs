use std::{sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use log::*;
use reqwest::header::CONTENT_TYPE;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    api::TopicConfig,
    db_types::{LogEvent, NewCallbackAttempt, WebhookDeliveryEvent},
    traits::SettlementDatabase,
    workers::{RetryPolicy, WorkerConfig},
};

/// The result of one webhook POST, as seen by the audit trail. A transport-level failure (connect error,
/// timeout) has no HTTP status.
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    pub http_status: Option<u16>,
    pub body: String,
}

impl CallbackResponse {
    pub fn is_success(&self) -> bool {
        self.http_status.is_some_and(|s| (200..300).contains(&s))
    }
}

/// The HTTP seam of the webhook sender. Production uses [`HttpCallbackTransport`]; tests substitute a
/// scripted fake so delivery and audit semantics can be pinned down without a live endpoint.
pub trait CallbackTransport: Send + Sync {
    fn post<'a>(&'a self, url: &'a str, body: &'a str) -> BoxFuture<'a, CallbackResponse>;
}

pub struct HttpCallbackTransport {
    client: reqwest::Client,
}

impl HttpCallbackTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl CallbackTransport for HttpCallbackTransport {
    fn post<'a>(&'a self, url: &'a str, body: &'a str) -> BoxFuture<'a, CallbackResponse> {
        Box::pin(async move {
            let result =
                self.client.post(url).header(CONTENT_TYPE, "application/json").body(body.to_string()).send().await;
            match result {
                Ok(response) => {
                    let http_status = Some(response.status().as_u16());
                    let body = response.text().await.unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                    CallbackResponse { http_status, body }
                },
                Err(e) => CallbackResponse { http_status: None, body: e.to_string() },
            }
        })
    }
}

/// What happened to one delivery event. `Delivered` and `Exhausted` both advance the offset; exhaustion is
/// final for the pipeline, with the full attempt history preserved in the callback audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { attempts: u32 },
    Exhausted { attempts: u32 },
    /// Undecodable event, skipped without any POST.
    Skipped,
    /// Shutdown interrupted the retry schedule; the offset stays put and delivery resumes on restart.
    Abandoned,
}

impl DeliveryOutcome {
    fn commits(&self) -> bool {
        !matches!(self, DeliveryOutcome::Abandoned)
    }
}

/// Starts the webhook sender pool: `config.workers` tasks draining the webhook-delivery topic as one
/// consumer group. Do not await the handles before signalling `shutdown`.
pub fn start_webhook_senders<B>(
    db: B,
    transport: Arc<dyn CallbackTransport>,
    topics: TopicConfig,
    config: &WorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    B: SettlementDatabase + Send + Sync + 'static,
{
    let partition_count = db.partition_count();
    let workers = config.workers.max(1);
    (0..workers)
        .map(|idx| {
            let partitions = (0..partition_count).filter(|p| p % workers == idx).collect::<Vec<u32>>();
            let db = db.clone();
            let transport = Arc::clone(&transport);
            let topics = topics.clone();
            let config = config.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_sender(db, transport, topics, idx, partitions, config, shutdown).await;
            })
        })
        .collect()
}

async fn run_sender<B>(
    db: B,
    transport: Arc<dyn CallbackTransport>,
    topics: TopicConfig,
    idx: u32,
    partitions: Vec<u32>,
    config: WorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    B: SettlementDatabase + Send + Sync + 'static,
{
    let group = topics.consumer_group;
    let topic = topics.webhook_topic;
    info!("📨️ Webhook sender {idx} started. Partitions: {partitions:?}");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let event = match db.next_event(&group, &topic, &partitions).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                idle_wait(config.poll_interval, &mut shutdown).await;
                continue;
            },
            Err(e) => {
                error!("📨️ Webhook sender {idx} could not poll the log: {e}");
                idle_wait(config.poll_interval, &mut shutdown).await;
                continue;
            },
        };
        let outcome = deliver_one(&db, transport.as_ref(), &event, &config.retry, &mut shutdown).await;
        if outcome.commits() {
            if let Err(e) = db.commit_event(&group, &event).await {
                error!("📨️ Could not commit offset for seq {} on {topic}/{}: {e}", event.seq, event.partition_id);
            }
        }
    }
    info!("📨️ Webhook sender {idx} stopped");
}

/// Deliver one webhook event, retrying non-2xx responses and transport failures per `retry`. Every attempt
/// lands in the callback audit log, whatever its outcome. Extracted from the worker loop for testability.
pub async fn deliver_one<B>(
    db: &B,
    transport: &dyn CallbackTransport,
    event: &LogEvent,
    retry: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
) -> DeliveryOutcome
where
    B: SettlementDatabase,
{
    let delivery = match event.decode::<WebhookDeliveryEvent>() {
        Ok(d) => d,
        Err(e) => {
            error!("📨️ Undecodable payload at seq {} on partition {}: {e}. Skipping.", event.seq, event.partition_id);
            return DeliveryOutcome::Skipped;
        },
    };
    let body = match serde_json::to_string(&delivery.payload_snapshot) {
        Ok(b) => b,
        Err(e) => {
            error!("📨️ Could not serialise webhook payload for [{}]: {e}. Skipping.", delivery.transaction_id);
            return DeliveryOutcome::Skipped;
        },
    };
    let mut attempts = 0u32;
    loop {
        let response = transport.post(&delivery.callback_url, &body).await;
        attempts += 1;
        let attempt = NewCallbackAttempt {
            transaction_id: delivery.transaction_id.clone(),
            http_status: response.http_status.map(i64::from),
            request_body: body.clone(),
            response_body: response.body.clone(),
        };
        if let Err(e) = db.record_callback_attempt(attempt).await {
            error!("📨️ Could not record callback attempt for [{}]: {e}", delivery.transaction_id);
        }
        if response.is_success() {
            info!(
                "📨️ Webhook for [{}] delivered to {} on attempt {attempts}",
                delivery.transaction_id, delivery.callback_url
            );
            return DeliveryOutcome::Delivered { attempts };
        }
        if attempts > retry.max_retries() {
            error!(
                "📨️ Webhook for [{}] undeliverable to {} after {attempts} attempts. Giving up; the attempt \
                 history is in the callback log.",
                delivery.transaction_id, delivery.callback_url
            );
            return DeliveryOutcome::Exhausted { attempts };
        }
        let delay = retry.delay_for(attempts - 1);
        warn!(
            "📨️ Webhook for [{}] got {:?} from {}. Retry {attempts} in {delay:?}",
            delivery.transaction_id, response.http_status, delivery.callback_url
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown.changed() => return DeliveryOutcome::Abandoned,
        }
    }
}

async fn idle_wait(poll_interval: Duration, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(poll_interval) => {},
        _ = shutdown.changed() => {},
    }
}
