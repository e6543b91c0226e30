//! Merchant Payment Gateway — Settlement Engine
//!
//! The settlement engine is the core of the merchant payment platform: it keeps the wallet ledger, runs the
//! transaction status state machine, and moves settlement work through a durable, partitioned,
//! at-least-once event log. This library is provider-agnostic; gateway integrations plug in behind the
//! [`traits::PaymentProcessor`] contract.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`mod@sqlite`]). SQLite is the reference backend; the schema also carries the durable event
//!    log, so the compare-and-swap on transaction status, the wallet mutation and the webhook enqueue commit
//!    as one database transaction. You should never need to touch the database directly — use the public
//!    APIs. The exception is the row types, which live in [`db_types`] and are public.
//! 2. The public API ([`SettlementFlowApi`], [`ReconciliationApi`]). These are generic over the
//!    [`traits::SettlementDatabase`] contract, so specific backends implement the storage traits to drive
//!    the engine.
//! 3. The worker pools ([`mod@workers`]). The status dispatcher and webhook sender drain the two durable
//!    topics as consumer groups, with bounded retries and per-partition ordering.
//!
//! The engine also emits events that can be subscribed to: a hook fires when a transaction settles, and
//! another when the reconciliation sweep finds a wallet whose balance deviates from its transaction history.
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod traits;
pub mod workers;

mod api;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use api::{LedgerReport, ReconciliationApi, SettlementFlowApi, TopicConfig, MIN_JUSTIFICATION_LEN};
#[cfg(feature = "sqlite")]
pub use sqlite::{db, SqliteDatabase};
