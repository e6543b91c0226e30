use std::time::Duration;

use log::*;
use settlement_engine::{events::EventProducers, ReconciliationApi, SqliteDatabase};
use tokio::{sync::watch, task::JoinHandle};

/// Starts the periodic ledger health check. Anomalies are published through the producers and logged; the
/// worker never mutates the ledger.
pub fn start_health_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = ReconciliationApi::new(db, producers);
        info!("🩺️ Ledger health worker started (every {interval:?})");
        loop {
            tokio::select! {
                _ = timer.tick() => {},
                _ = shutdown.changed() => break,
            }
            debug!("🩺️ Running ledger reconciliation sweep");
            match api.run_check().await {
                Ok(report) if report.is_clean() => {
                    info!("🩺️ Ledger clean: {} wallets checked", report.wallets_checked);
                },
                Ok(report) => {
                    error!(
                        "🩺️ Ledger reconciliation found {} anomalous wallet(s) out of {}",
                        report.anomalies.len(),
                        report.wallets_checked
                    );
                },
                Err(e) => {
                    error!("🩺️ Error running ledger reconciliation sweep: {e}");
                },
            }
        }
        info!("🩺️ Ledger health worker stopped");
    })
}
