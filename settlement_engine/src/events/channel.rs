//! In-process event fan-out.
//!
//! A bounded mpsc channel connects any number of [`EventProducer`]s to one [`EventHandler`], which runs the
//! subscriber hook for every event it receives. Hooks are spawned, so a slow subscriber never stalls the
//! settlement path that published the event; the handler drains every in-flight hook before it returns.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{sync::mpsc, task::JoinSet};

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, hook: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, hook }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer { sender: self.sender.clone() }
    }

    /// Runs until every subscribed producer has been dropped, then waits for the hooks still in flight.
    /// The handler's own sender is dropped first; otherwise the receive loop would never see the channel
    /// close.
    pub async fn start_handler(mut self) {
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        while let Some(event) = self.receiver.recv().await {
            let hook = Arc::clone(&self.hook);
            in_flight.spawn(async move { (hook)(event).await });
            // reap completed hooks as we go so the set only holds live tasks
            while in_flight.try_join_next().is_some() {}
        }
        debug!("📬️ All producers gone. Draining {} in-flight hook(s)", in_flight.len());
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                warn!("📬️ A subscriber hook panicked: {e}");
            }
        }
        debug!("📬️ Event handler drained and shut down");
    }
}

pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

// Not derived: a producer is clonable whether or not the event type is.
impl<E: Send + Sync> Clone for EventProducer<E> {
    fn clone(&self) -> Self {
        Self { sender: self.sender.clone() }
    }
}

impl<E: Send + Sync> EventProducer<E> {
    pub async fn publish_event(&self, event: E) {
        if self.sender.send(event).await.is_err() {
            error!("📬️ Event dropped: the handler has already shut down");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn slow_hooks_all_complete_before_the_drain_returns() {
        let _ = env_logger::try_init();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let hook: Handler<&'static str> = Arc::new(move |label| {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                // deliberately slower than the publishing side
                tokio::time::sleep(tokio::time::Duration::from_millis(25)).await;
                sink.lock().unwrap().push(label);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handler = EventHandler::new(2, hook);
        let settlements = handler.subscribe();
        let anomalies = handler.subscribe();
        tokio::spawn(async move {
            for label in ["deposit-settled", "withdrawal-settled", "refund-applied"] {
                settlements.publish_event(label).await;
            }
        });
        tokio::spawn(async move {
            anomalies.publish_event("wallet-drift").await;
        });

        handler.start_handler().await;
        let mut labels = seen.lock().unwrap().clone();
        labels.sort_unstable();
        assert_eq!(labels, vec!["deposit-settled", "refund-applied", "wallet-drift", "withdrawal-settled"]);
    }
}
