//! Process wiring for the settlement pipeline: configuration, database boot, hook registration, the two
//! worker pools, the ledger health worker, and cooperative shutdown.
mod config;
mod errors;
mod health_worker;

use std::sync::Arc;

use dotenvy::dotenv;
use futures_util::{future::join_all, FutureExt};
use log::*;
use settlement_engine::{
    db,
    events::{EventHandlers, EventHooks},
    traits::{ProcessorRegistry, SettlementDatabase},
    workers::{start_status_dispatcher, start_webhook_senders, CallbackTransport, HttpCallbackTransport},
    SettlementFlowApi,
    SqliteDatabase,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::sync::watch;

use crate::{config::ServerConfig, errors::ServerError, health_worker::start_health_worker};

const HOOK_BUFFER_SIZE: usize = 100;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Starting the settlement pipeline");
    match run(config).await {
        Ok(()) => println!("Bye!"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        },
    }
}

async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let retry = config.retry_policy().map_err(|e| ServerError::Configuration(e.to_string()))?;
    let url = config.database_url.reveal().as_str();
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::create_database(url).await?;
        info!("🚀️ Created database");
    }
    let mut database =
        SqliteDatabase::new_with_url(url, config.max_db_connections, config.partitions).await?;
    db::run_migrations(database.pool()).await?;

    let handlers = EventHandlers::new(HOOK_BUFFER_SIZE, logging_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    // Gateway integrations register their processors here.
    let registry = ProcessorRegistry::new();
    if registry.media().is_empty() {
        warn!("🚀️ No payment processors registered; gateway callbacks cannot be ingested");
    }
    let api = Arc::new(SettlementFlowApi::new(
        database.clone(),
        producers.clone(),
        registry,
        config.topics.clone(),
    ));

    let (shutdown_signal, shutdown) = watch::channel(false);
    let mut handles =
        start_status_dispatcher(Arc::clone(&api), &config.dispatcher_config(retry.clone()), shutdown.clone());
    let transport: Arc<dyn CallbackTransport> = Arc::new(
        HttpCallbackTransport::new(config.request_timeout)
            .map_err(|e| ServerError::Initialization(e.to_string()))?,
    );
    handles.extend(start_webhook_senders(
        database.clone(),
        transport,
        config.topics.clone(),
        &config.sender_config(retry),
        shutdown.clone(),
    ));
    handles.push(start_health_worker(database.clone(), producers, config.health_check_interval, shutdown));

    tokio::signal::ctrl_c().await.map_err(|e| ServerError::Initialization(e.to_string()))?;
    info!("🚀️ Shutdown signal received; draining workers");
    let _ = shutdown_signal.send(true);
    join_all(handles).await;

    database.close().await.map_err(|e| ServerError::Database(e.to_string()))?;
    info!("🚀️ Settlement pipeline stopped");
    Ok(())
}

/// In-process hooks the server registers out of the box: structured log lines for settled transactions and
/// ledger anomalies. Downstream deployments replace or extend these.
fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_transaction_settled(|ev| {
        async move {
            info!(
                "🪝️ Transaction [{}] for merchant {} settled: {} → {} ({})",
                ev.transaction.id, ev.transaction.merchant_id, ev.previous_status, ev.transaction.status,
                ev.transaction.amount
            );
        }
        .boxed()
    });
    hooks.on_anomaly_detected(|ev| {
        async move {
            error!(
                "🪝️ Ledger anomaly: wallet #{} ({} {}) holds {}, expected {} (deviation {})",
                ev.anomaly.wallet_id,
                ev.anomaly.owner_type,
                ev.anomaly.owner_id,
                ev.anomaly.actual,
                ev.anomaly.expected,
                ev.anomaly.deviation()
            );
        }
        .boxed()
    });
    hooks
}
