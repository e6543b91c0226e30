//! Behaviour contracts for settlement-engine backends.
//!
//! The storage traits are split by concern ([`WalletLedger`], [`TransactionStore`], [`EventLog`],
//! [`CallbackAudit`]) and unified by [`SettlementDatabase`], the bound the public APIs are generic over.
//! [`PaymentProcessor`] is the seam to the external payment gateways; the engine never sees a gateway's wire
//! format, only this contract.
mod callback_audit;
mod event_log;
mod ledger;
mod processor;
mod settlement_database;
mod transactions;

pub use callback_audit::CallbackAudit;
pub use event_log::EventLog;
pub use ledger::{LedgerError, WalletLedger};
pub use processor::{
    GatewayCallback,
    PaymentProcessor,
    PaymentRequest,
    PaymentResponse,
    ProcessorError,
    ProcessorRegistry,
};
pub use settlement_database::{SettlementDatabase, SettlementError, SettlementOutcome};
pub use transactions::TransactionStore;
