use mpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{Transaction, TransactionStatus, Wallet};

/// Emitted when a transaction reaches a terminal status through the settlement pipeline or an administrative
/// override. Subscribers get the record as it stood when the settlement committed.
#[derive(Debug, Clone)]
pub struct TransactionSettledEvent {
    pub transaction: Transaction,
    pub previous_status: TransactionStatus,
}

impl TransactionSettledEvent {
    pub fn new(transaction: Transaction, previous_status: TransactionStatus) -> Self {
        Self { transaction, previous_status }
    }
}

/// A wallet whose `available + locked` total deviates from the transaction-derived expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAnomaly {
    pub wallet_id: i64,
    pub owner_type: String,
    pub owner_id: String,
    pub actual: Money,
    pub expected: Money,
}

impl LedgerAnomaly {
    pub fn deviation(&self) -> Money {
        self.actual - self.expected
    }
}

/// Emitted by the reconciliation sweep for every anomalous wallet it finds. The health check only reports;
/// it never mutates the ledger.
#[derive(Debug, Clone)]
pub struct AnomalyDetectedEvent {
    pub anomaly: LedgerAnomaly,
}

impl AnomalyDetectedEvent {
    pub fn new(wallet: &Wallet, expected: Money) -> Self {
        Self {
            anomaly: LedgerAnomaly {
                wallet_id: wallet.id,
                owner_type: wallet.owner_type.to_string(),
                owner_id: wallet.owner_id.clone(),
                actual: wallet.total(),
                expected,
            },
        }
    }
}
