use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{AnomalyDetectedEvent, EventHandler, EventProducer, Handler, TransactionSettledEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub transaction_settled_producer: Vec<EventProducer<TransactionSettledEvent>>,
    pub anomaly_producer: Vec<EventProducer<AnomalyDetectedEvent>>,
}

pub struct EventHandlers {
    pub on_transaction_settled: Option<EventHandler<TransactionSettledEvent>>,
    pub on_anomaly_detected: Option<EventHandler<AnomalyDetectedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_transaction_settled = hooks.on_transaction_settled.map(|f| EventHandler::new(buffer_size, f));
        let on_anomaly_detected = hooks.on_anomaly_detected.map(|f| EventHandler::new(buffer_size, f));
        Self { on_transaction_settled, on_anomaly_detected }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_transaction_settled {
            result.transaction_settled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_anomaly_detected {
            result.anomaly_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_transaction_settled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_anomaly_detected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_transaction_settled: Option<Handler<TransactionSettledEvent>>,
    pub on_anomaly_detected: Option<Handler<AnomalyDetectedEvent>>,
}

impl EventHooks {
    pub fn on_transaction_settled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionSettledEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_transaction_settled = Some(Arc::new(f));
        self
    }

    pub fn on_anomaly_detected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AnomalyDetectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_anomaly_detected = Some(Arc::new(f));
        self
    }
}
