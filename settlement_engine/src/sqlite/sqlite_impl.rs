//! `SqliteDatabase` is a concrete settlement-engine backend.
//!
//! It implements every trait in the [`crate::traits`] module over a SQLite connection pool. The compound
//! operations (`apply_status_event`, `apply_status_override`) run inside a single database transaction so
//! that the status compare-and-swap, the wallet mutation and the webhook enqueue commit or roll back as one
//! unit.
use std::fmt::Debug;

use log::*;
use mpg_common::Money;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{callback_logs, event_log, new_pool, overrides, transactions, wallets};
use crate::{
    db_types::{
        CallbackLogEntry,
        LogEvent,
        NewCallbackAttempt,
        NewStatusOverride,
        NewTransaction,
        PaymentStatusEvent,
        StatusOverride,
        Transaction,
        TransactionId,
        TransactionStatus,
        TransactionType,
        Wallet,
        WalletOwnerType,
        WebhookDeliveryEvent,
        WebhookPayload,
    },
    helpers::partition_for_key,
    traits::{
        CallbackAudit,
        EventLog,
        LedgerError,
        SettlementDatabase,
        SettlementError,
        SettlementOutcome,
        TransactionStore,
        WalletLedger,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    partitions: u32,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32, partitions: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, partitions })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl WalletLedger for SqliteDatabase {
    async fn fetch_wallet(&self, owner_type: WalletOwnerType, owner_id: &str) -> Result<Option<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(LedgerError::from)?;
        Ok(wallets::fetch_wallet(owner_type, owner_id, &mut conn).await?)
    }

    async fn fetch_admin_wallet(&self) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(LedgerError::from)?;
        wallets::fetch_admin_wallet(&mut conn).await
    }

    async fn fetch_all_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(LedgerError::from)?;
        Ok(wallets::fetch_all(&mut conn).await?)
    }

    async fn fetch_or_create_wallet(
        &self,
        owner_type: WalletOwnerType,
        owner_id: &str,
        currency: &str,
    ) -> Result<Wallet, LedgerError> {
        let mut conn = self.pool.acquire().await.map_err(LedgerError::from)?;
        wallets::fetch_or_create(owner_type, owner_id, currency, &mut conn).await
    }

    async fn lock_withdrawal(&self, merchant_id: &str, amount: Money) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::from)?;
        let wallet = wallets::lock_withdrawal(merchant_id, amount, &mut tx).await?;
        tx.commit().await.map_err(LedgerError::from)?;
        debug!("🏦️ Locked {amount} for withdrawal on merchant {merchant_id}");
        Ok(wallet)
    }

    async fn settle_withdrawal_success(
        &self,
        merchant_id: &str,
        amount: Money,
        commission: Money,
    ) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::from)?;
        let wallet = wallets::settle_withdrawal_success(merchant_id, amount, commission, &mut tx).await?;
        tx.commit().await.map_err(LedgerError::from)?;
        Ok(wallet)
    }

    async fn settle_withdrawal_failure(&self, merchant_id: &str, amount: Money) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::from)?;
        let wallet = wallets::settle_withdrawal_failure(merchant_id, amount, &mut tx).await?;
        tx.commit().await.map_err(LedgerError::from)?;
        Ok(wallet)
    }

    async fn settle_deposit_success(
        &self,
        merchant_id: &str,
        amount: Money,
        commission: Money,
    ) -> Result<Wallet, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(LedgerError::from)?;
        let wallet = wallets::settle_deposit_success(merchant_id, amount, commission, &mut tx).await?;
        tx.commit().await.map_err(LedgerError::from)?;
        Ok(wallet)
    }
}

impl TransactionStore for SqliteDatabase {
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<(Transaction, bool), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::idempotent_insert(tx, &mut conn).await?)
    }

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_by_id(id, &mut conn).await?)
    }

    async fn merchant_settled_net(&self, merchant_id: &str) -> Result<Money, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::merchant_settled_net(merchant_id, &mut conn).await?)
    }

    async fn admin_settled_net(&self) -> Result<Money, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::admin_settled_net(&mut conn).await?)
    }
}

impl EventLog for SqliteDatabase {
    fn partition_count(&self) -> u32 {
        self.partitions
    }

    async fn append_event(&self, topic: &str, key: &str, payload: String) -> Result<LogEvent, SettlementError> {
        let partition = partition_for_key(key, self.partitions);
        let mut conn = self.pool.acquire().await?;
        let event = event_log::append(topic, partition, key, &payload, &mut conn).await?;
        trace!("📨️ Appended event #{} to {topic}/{partition} for key {key}", event.seq);
        Ok(event)
    }

    async fn next_event(
        &self,
        group: &str,
        topic: &str,
        partitions: &[u32],
    ) -> Result<Option<LogEvent>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(event_log::next_event(group, topic, partitions, &mut conn).await?)
    }

    async fn commit_event(&self, group: &str, event: &LogEvent) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let partition = event.partition_id as u32;
        event_log::commit_offset(group, &event.topic, partition, event.seq + 1, &mut conn).await?;
        Ok(())
    }

    async fn rewind(&self, group: &str, topic: &str, partition: u32, seq: i64) -> Result<(), SettlementError> {
        let mut conn = self.pool.acquire().await?;
        event_log::commit_offset(group, topic, partition, seq, &mut conn).await?;
        info!("📨️ Rewound {group} on {topic}/{partition} to seq {seq}");
        Ok(())
    }
}

impl CallbackAudit for SqliteDatabase {
    async fn record_callback_attempt(&self, attempt: NewCallbackAttempt) -> Result<CallbackLogEntry, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callback_logs::insert_attempt(attempt, &mut conn).await?)
    }

    async fn callback_attempts_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<CallbackLogEntry>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(callback_logs::fetch_for_transaction(id, &mut conn).await?)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn apply_status_event(
        &self,
        event: &PaymentStatusEvent,
        webhook_topic: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        let target = event.target_status;
        if target == TransactionStatus::Refunded {
            // Refunds never arrive from a gateway; only the override path may request them.
            return Err(SettlementError::MalformedEvent(format!(
                "status event for {} targets REFUNDED, which is reserved for administrative overrides",
                event.transaction_id
            )));
        }
        let mut tx = self.pool.begin().await?;
        let record = transactions::fetch_by_id(&event.transaction_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(event.transaction_id.clone()))?;
        if record.status.rank() >= target.rank() {
            debug!("🗃️ [{}] already at or past {target}; absorbing redelivered event", record.id);
            return Ok(SettlementOutcome::AlreadyApplied { transaction: record });
        }
        if !record.status.can_transition_to(target) {
            return Err(SettlementError::IllegalTransition {
                transaction_id: record.id.clone(),
                from: record.status,
                to: target,
            });
        }
        let outcome = self.settle_in_tx(record, target, webhook_topic, &mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_status_override(
        &self,
        ovr: &NewStatusOverride,
        webhook_topic: &str,
    ) -> Result<SettlementOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let record = transactions::fetch_by_id(&ovr.transaction_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::TransactionNotFound(ovr.transaction_id.clone()))?;
        if record.status == ovr.new_status {
            debug!("🗃️ Override for [{}] matches current status {}; no-op", record.id, record.status);
            return Ok(SettlementOutcome::AlreadyApplied { transaction: record });
        }
        if !record.status.can_transition_to(ovr.new_status) {
            return Err(SettlementError::IllegalTransition {
                transaction_id: record.id.clone(),
                from: record.status,
                to: ovr.new_status,
            });
        }
        overrides::insert_override(ovr, record.status, &mut tx).await?;
        let outcome = self.settle_in_tx(record, ovr.new_status, webhook_topic, &mut tx).await?;
        tx.commit().await?;
        if let SettlementOutcome::Applied { transaction, .. } = &outcome {
            warn!(
                "🗃️ Admin {} overrode transaction [{}] to {} ({})",
                ovr.admin_id, transaction.id, transaction.status, ovr.justification
            );
        }
        Ok(outcome)
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// The shared second half of event and override application. Runs inside the caller's transaction:
    /// ledger mutation, status CAS, and webhook enqueue all commit together.
    async fn settle_in_tx(
        &self,
        record: Transaction,
        target: TransactionStatus,
        webhook_topic: &str,
        conn: &mut SqliteConnection,
    ) -> Result<SettlementOutcome, SettlementError> {
        apply_ledger_effect(&record, target, &mut *conn).await?;
        let updated = transactions::update_status_cas(&record.id, record.status, target, &mut *conn)
            .await?
            .ok_or_else(|| {
                // The row changed under us between the fetch and the CAS. Retrying will re-read and absorb.
                SettlementError::TransientInfra(format!("concurrent status change on transaction {}", record.id))
            })?;
        let webhook_enqueued = if updated.status.is_terminal() {
            let payload = WebhookPayload::for_transaction(&updated);
            let delivery = WebhookDeliveryEvent {
                transaction_id: updated.id.clone(),
                merchant_id: updated.merchant_id.clone(),
                callback_url: updated.callback_url.clone(),
                payload_snapshot: payload,
            };
            let body = serde_json::to_string(&delivery)
                .map_err(|e| SettlementError::TransientInfra(e.to_string()))?;
            let partition = partition_for_key(updated.id.as_str(), self.partitions);
            event_log::append(webhook_topic, partition, updated.id.as_str(), &body, conn).await?;
            debug!("🗃️ [{}] reached {}; webhook delivery enqueued", updated.id, updated.status);
            true
        } else {
            debug!("🗃️ [{}] moved to {}", updated.id, updated.status);
            false
        };
        Ok(SettlementOutcome::Applied { transaction: updated, previous_status: record.status, webhook_enqueued })
    }
}

/// Maps a legal status transition to its wallet ledger effect and executes it on the caller's connection.
async fn apply_ledger_effect(
    record: &Transaction,
    target: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<(), LedgerError> {
    use TransactionStatus::*;
    match (record.tx_type, target) {
        // No money moves until a terminal status is reached.
        (_, Pending) => Ok(()),
        (TransactionType::Deposit, Success) => {
            wallets::settle_deposit_success(&record.merchant_id, record.merchant_net, record.admin_net, conn)
                .await
                .map(|_| ())
        },
        // A failed deposit took no lock, so there is nothing to undo.
        (TransactionType::Deposit, Failed | Expired | Canceled) => Ok(()),
        (TransactionType::Withdrawal, Success) => {
            wallets::settle_withdrawal_success(&record.merchant_id, record.amount, record.admin_net, conn)
                .await
                .map(|_| ())
        },
        (TransactionType::Withdrawal, Failed | Expired | Canceled) => {
            wallets::settle_withdrawal_failure(&record.merchant_id, record.amount, conn).await.map(|_| ())
        },
        (TransactionType::Deposit, Refunded) => {
            wallets::reverse_deposit_success(&record.merchant_id, record.merchant_net, record.admin_net, conn)
                .await
                .map(|_| ())
        },
        (TransactionType::Withdrawal, Refunded) => {
            wallets::reverse_withdrawal_success(&record.merchant_id, record.amount, record.admin_net, conn)
                .await
                .map(|_| ())
        },
        (_, Initiated) => Ok(()),
    }
}

impl SqliteDatabase {
    /// Fetch the override audit trail for a transaction.
    pub async fn overrides_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<StatusOverride>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        Ok(overrides::fetch_for_transaction(id, &mut conn).await?)
    }
}
