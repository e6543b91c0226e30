//! Webhook delivery: bounded retries, the per-attempt audit trail, and giving up gracefully.
mod support;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::future::BoxFuture;
use settlement_engine::{
    db_types::{LogEvent, PaymentStatusEvent, TransactionStatus, WebhookPayload},
    traits::{CallbackAudit, EventLog},
    workers::{deliver_one, CallbackResponse, CallbackTransport, DeliveryOutcome, RetryPolicy},
    SettlementFlowApi,
    SqliteDatabase,
};
use tokio::sync::watch;

use crate::support::{new_deposit, setup, tear_down, PARTITIONS};

/// Serves a scripted sequence of responses and records every request it sees.
struct ScriptedTransport {
    responses: Mutex<VecDeque<CallbackResponse>>,
    requests: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    /// `None` scripts a transport-level failure (no HTTP status).
    fn new(script: &[Option<u16>]) -> Self {
        let responses = script
            .iter()
            .map(|status| CallbackResponse {
                http_status: *status,
                body: match status {
                    Some(s) if (200..300).contains(s) => "ok".to_string(),
                    Some(s) => format!("error {s}"),
                    None => "connection refused".to_string(),
                },
            })
            .collect();
        Self { responses: Mutex::new(responses), requests: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl CallbackTransport for ScriptedTransport {
    fn post<'a>(&'a self, url: &'a str, body: &'a str) -> BoxFuture<'a, CallbackResponse> {
        Box::pin(async move {
            self.requests.lock().unwrap().push((url.to_string(), body.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(CallbackResponse { http_status: Some(200), body: "ok".to_string() })
        })
    }
}

/// Settles a deposit and returns the delivery event it enqueued.
async fn enqueued_webhook(api: &SettlementFlowApi<SqliteDatabase>, id: &str) -> LogEvent {
    let tx = new_deposit(api.db(), id, "acme", 10_000, 200, 50).await;
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Pending)).await.unwrap();
    api.process_status_event(&PaymentStatusEvent::new(tx.id.clone(), TransactionStatus::Success)).await.unwrap();
    let partitions = (0..PARTITIONS).collect::<Vec<_>>();
    api.db()
        .next_event(&api.topics().consumer_group, &api.topics().webhook_topic, &partitions)
        .await
        .unwrap()
        .expect("No webhook enqueued")
}

#[tokio::test]
async fn failing_callbacks_are_retried_until_delivered() {
    let api = setup().await;
    let (_sig, mut shutdown) = watch::channel(false);
    let transport = ScriptedTransport::new(&[Some(500), Some(500), Some(500), Some(200)]);
    let event = enqueued_webhook(&api, "dep-5001").await;

    let outcome = deliver_one(api.db(), &transport, &event, &RetryPolicy::no_delay(5), &mut shutdown).await;
    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 4 });

    let tx_id = "dep-5001".parse().unwrap();
    let trail = api.db().callback_attempts_for_transaction(&tx_id).await.unwrap();
    assert_eq!(trail.len(), 4);
    assert!(trail[..3].iter().all(|a| a.http_status == Some(500)));
    assert_eq!(trail[3].http_status, Some(200));
    // every attempt carried the same snapshotted payload
    let payload: WebhookPayload = serde_json::from_str(&trail[0].request_body).unwrap();
    assert_eq!(payload.transaction_id, tx_id);
    assert_eq!(payload.status, TransactionStatus::Success);
    assert_eq!(trail[0].request_body, trail[3].request_body);

    let requests = transport.requests.lock().unwrap();
    assert_eq!(requests.len(), 4);
    assert!(requests.iter().all(|(url, _)| url == "https://acme.example.com/webhooks"));
    tear_down(api).await;
}

#[tokio::test]
async fn delivery_gives_up_after_the_retry_schedule() {
    let api = setup().await;
    let (_sig, mut shutdown) = watch::channel(false);
    let transport = ScriptedTransport::new(&[Some(503); 10]);
    let event = enqueued_webhook(&api, "dep-5002").await;

    let outcome = deliver_one(api.db(), &transport, &event, &RetryPolicy::no_delay(2), &mut shutdown).await;
    // one initial attempt plus two retries, all preserved in the audit log
    assert_eq!(outcome, DeliveryOutcome::Exhausted { attempts: 3 });
    let trail = api.db().callback_attempts_for_transaction(&"dep-5002".parse().unwrap()).await.unwrap();
    assert_eq!(trail.len(), 3);
    assert!(trail.iter().all(|a| a.http_status == Some(503)));
    tear_down(api).await;
}

#[tokio::test]
async fn transport_failures_are_recorded_without_an_http_status() {
    let api = setup().await;
    let (_sig, mut shutdown) = watch::channel(false);
    let transport = ScriptedTransport::new(&[None, Some(200)]);
    let event = enqueued_webhook(&api, "dep-5003").await;

    let outcome = deliver_one(api.db(), &transport, &event, &RetryPolicy::no_delay(5), &mut shutdown).await;
    assert_eq!(outcome, DeliveryOutcome::Delivered { attempts: 2 });
    let trail = api.db().callback_attempts_for_transaction(&"dep-5003".parse().unwrap()).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[0].http_status, None);
    assert_eq!(trail[0].response_body, "connection refused");
    assert_eq!(trail[1].http_status, Some(200));
    tear_down(api).await;
}

#[tokio::test]
async fn shutdown_during_a_retry_backoff_leaves_the_event_for_redelivery() {
    let api = setup().await;
    let transport = ScriptedTransport::new(&[Some(500)]);
    let event = enqueued_webhook(&api, "dep-5004").await;

    // shutdown is already signalled when the first failure starts its backoff
    let (sig, mut shutdown) = watch::channel(false);
    sig.send(true).unwrap();
    let retry = RetryPolicy::new(3, vec![Duration::from_secs(30); 3]).unwrap();
    let outcome = deliver_one(api.db(), &transport, &event, &retry, &mut shutdown).await;
    assert_eq!(outcome, DeliveryOutcome::Abandoned);

    // the failed attempt made it onto the audit trail, and the uncommitted event is still first in line
    let trail = api.db().callback_attempts_for_transaction(&"dep-5004".parse().unwrap()).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].http_status, Some(500));
    let partitions = (0..PARTITIONS).collect::<Vec<_>>();
    let redelivered = api
        .db()
        .next_event(&api.topics().consumer_group, &api.topics().webhook_topic, &partitions)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(redelivered.seq, event.seq);
    tear_down(api).await;
}

#[tokio::test]
async fn undecodable_delivery_events_are_skipped() {
    let api = setup().await;
    let (_sig, mut shutdown) = watch::channel(false);
    let transport = ScriptedTransport::new(&[]);
    let topic = api.topics().webhook_topic.clone();
    let event = api.db().append_event(&topic, "tx-junk", "][".to_string()).await.unwrap();

    let outcome = deliver_one(api.db(), &transport, &event, &RetryPolicy::no_delay(2), &mut shutdown).await;
    assert_eq!(outcome, DeliveryOutcome::Skipped);
    assert!(transport.requests.lock().unwrap().is_empty());
    tear_down(api).await;
}
