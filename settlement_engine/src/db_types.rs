use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use mpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(pub String);

//--------------------------------------   WalletOwnerType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WalletOwnerType {
    /// A merchant trading on the platform.
    Merchant,
    /// The platform itself. Exactly one admin wallet exists, by convention.
    Admin,
}

impl Display for WalletOwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletOwnerType::Merchant => write!(f, "Merchant"),
            WalletOwnerType::Admin => write!(f, "Admin"),
        }
    }
}

impl FromStr for WalletOwnerType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Merchant" => Ok(Self::Merchant),
            "Admin" => Ok(Self::Admin),
            s => Err(ConversionError(format!("Invalid wallet owner type: {s}"))),
        }
    }
}

/// The owner id of the singleton admin wallet.
pub const ADMIN_WALLET_OWNER_ID: &str = "platform";

//--------------------------------------        Wallet        --------------------------------------------------------
/// A ledger balance record. `available_amount` is free to spend or withdraw; `locked_amount` is reserved for
/// in-flight withdrawals. Both are always non-negative. Wallets are only ever mutated through the ledger
/// operations on [`crate::traits::WalletLedger`] and are never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Wallet {
    pub id: i64,
    pub owner_type: WalletOwnerType,
    pub owner_id: String,
    pub available_amount: Money,
    pub locked_amount: Money,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// The invariant checked by the ledger health check: `available + locked` must equal the transaction-derived
    /// expectation for this wallet.
    pub fn total(&self) -> Money {
        self.available_amount + self.locked_amount
    }
}

//--------------------------------------    TransactionId     --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct TransactionId(pub String);

impl FromStr for TransactionId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TransactionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   TransactionType    --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "Deposit"),
            TransactionType::Withdrawal => write!(f, "Withdrawal"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deposit" => Ok(Self::Deposit),
            "Withdrawal" => Ok(Self::Withdrawal),
            s => Err(ConversionError(format!("Invalid transaction type: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMedium     --------------------------------------------------------
/// The payment rail a transaction moves over. Each medium has exactly one [`crate::traits::PaymentProcessor`]
/// implementation, resolved from the registry built at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentMedium {
    Card,
    MobileMoney,
    BankTransfer,
}

impl Display for PaymentMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMedium::Card => write!(f, "Card"),
            PaymentMedium::MobileMoney => write!(f, "MobileMoney"),
            PaymentMedium::BankTransfer => write!(f, "BankTransfer"),
        }
    }
}

impl FromStr for PaymentMedium {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Card" => Ok(Self::Card),
            "MobileMoney" => Ok(Self::MobileMoney),
            "BankTransfer" => Ok(Self::BankTransfer),
            s => Err(ConversionError(format!("Invalid payment medium: {s}"))),
        }
    }
}

//--------------------------------------  TransactionStatus   --------------------------------------------------------
/// The transaction status state machine:
///
/// ```text
/// INITIATED → PENDING → {SUCCESS, FAILED, EXPIRED, CANCELED}
/// SUCCESS → REFUNDED (administrative override only)
/// ```
///
/// All other transitions are rejected. Statuses are monotonic: once a transaction reaches a given rank it
/// never moves to a lower one, which is what makes redelivered status events safe to absorb as no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Success,
    Failed,
    Expired,
    Canceled,
    Refunded,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Initiated => write!(f, "INITIATED"),
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Failed => write!(f, "FAILED"),
            TransactionStatus::Expired => write!(f, "EXPIRED"),
            TransactionStatus::Canceled => write!(f, "CANCELED"),
            TransactionStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(Self::Initiated),
            "PENDING" => Ok(Self::Pending),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "EXPIRED" => Ok(Self::Expired),
            "CANCELED" => Ok(Self::Canceled),
            "REFUNDED" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Expired | Self::Canceled | Self::Refunded)
    }

    /// Monotonic rank of a status. A status event targeting a rank at or below the stored rank is a
    /// redelivery (or a late arrival) and must be absorbed without side effects.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Initiated => 0,
            Self::Pending => 1,
            Self::Success | Self::Failed | Self::Expired | Self::Canceled => 2,
            Self::Refunded => 3,
        }
    }

    /// Whether the transition `self → target` is legal.
    ///
    /// | From \ To | Pending | Success | Failed | Expired | Canceled | Refunded |
    /// |-----------|---------|---------|--------|---------|----------|----------|
    /// | Initiated | ✓       |         |        |         |          |          |
    /// | Pending   |         | ✓       | ✓      | ✓       | ✓        |          |
    /// | Success   |         |         |        |         |          | ✓ (*)    |
    ///
    /// (*) `Success → Refunded` is legal for the state machine, but only the administrative override path
    /// may request it; the status dispatcher rejects `REFUNDED` targets outright.
    pub fn can_transition_to(&self, target: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, target),
            (Initiated, Pending) |
                (Pending, Success) |
                (Pending, Failed) |
                (Pending, Expired) |
                (Pending, Canceled) |
                (Success, Refunded)
        )
    }
}

//--------------------------------------     Transaction      --------------------------------------------------------
/// A money movement between a merchant and the platform. Created once at initiation by code outside this
/// engine; after that, only the status dispatcher or an administrative override may mutate it, and only the
/// `status` and `updated_at` fields ever change. Never deleted.
#[derive(Debug, Clone, FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub merchant_id: String,
    pub tx_type: TransactionType,
    pub medium: PaymentMedium,
    /// The principal amount moved by this transaction.
    pub amount: Money,
    pub fee: Money,
    pub vat: Money,
    /// The gross amount including fees and VAT.
    pub total_amount: Money,
    /// The platform's commission, credited to the admin wallet on success.
    pub admin_net: Money,
    /// The amount credited to the merchant wallet on deposit success.
    pub merchant_net: Money,
    pub status: TransactionStatus,
    /// The provider-side transaction reference, if known.
    pub reference: Option<String>,
    /// The merchant's webhook endpoint, denormalized into the delivery event at enqueue time.
    pub callback_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------    NewTransaction    --------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: TransactionId,
    pub merchant_id: String,
    pub tx_type: TransactionType,
    pub medium: PaymentMedium,
    pub amount: Money,
    pub fee: Money,
    pub vat: Money,
    pub total_amount: Money,
    pub admin_net: Money,
    pub merchant_net: Money,
    pub reference: Option<String>,
    pub callback_url: String,
}

impl NewTransaction {
    pub fn new(
        id: TransactionId,
        merchant_id: String,
        tx_type: TransactionType,
        medium: PaymentMedium,
        amount: Money,
        callback_url: String,
    ) -> Self {
        Self {
            id,
            merchant_id,
            tx_type,
            medium,
            amount,
            fee: Money::zero(),
            vat: Money::zero(),
            total_amount: amount,
            admin_net: Money::zero(),
            merchant_net: amount,
            reference: None,
            callback_url,
        }
    }

    pub fn with_commission(mut self, fee: Money, vat: Money) -> Self {
        self.fee = fee;
        self.vat = vat;
        self.admin_net = fee + vat;
        self.total_amount = self.amount + fee + vat;
        self.merchant_net = self.amount;
        self
    }

    pub fn with_reference(mut self, reference: String) -> Self {
        self.reference = Some(reference);
        self
    }
}

//--------------------------------------  PaymentStatusEvent  --------------------------------------------------------
/// The payload carried on the payment-status topic. Immutable once appended; may be redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusEvent {
    pub transaction_id: TransactionId,
    pub target_status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PaymentStatusEvent {
    pub fn new(transaction_id: TransactionId, target_status: TransactionStatus) -> Self {
        Self { transaction_id, target_status, metadata: None }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

//-------------------------------------- WebhookDeliveryEvent --------------------------------------------------------
/// The payload carried on the webhook-delivery topic. The notification body is snapshotted at enqueue time so
/// that later payload-shape changes cannot retroactively alter a pending notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDeliveryEvent {
    pub transaction_id: TransactionId,
    pub merchant_id: String,
    pub callback_url: String,
    pub payload_snapshot: WebhookPayload,
}

//--------------------------------------    WebhookPayload    --------------------------------------------------------
/// The JSON body POSTed to the merchant's callback URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub message: String,
    pub amount: Money,
    pub provider_tx_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub merchant_id: String,
    pub user_id: Option<String>,
}

impl WebhookPayload {
    pub fn for_transaction(tx: &Transaction) -> Self {
        let event = match tx.tx_type {
            TransactionType::Deposit => "payment.status_changed".to_string(),
            TransactionType::Withdrawal => "withdrawal.status_changed".to_string(),
        };
        let message = format!("Transaction {} is now {}", tx.id, tx.status);
        Self {
            event,
            transaction_id: tx.id.clone(),
            status: tx.status,
            message,
            amount: tx.amount,
            provider_tx_id: tx.reference.clone(),
            timestamp: Utc::now(),
            merchant_id: tx.merchant_id.clone(),
            user_id: None,
        }
    }
}

//--------------------------------------      LogEvent        --------------------------------------------------------
/// A row in the durable event log. `seq` is globally monotonic; per-partition order is preserved because a
/// partition is only ever drained by one consumer at a time.
#[derive(Debug, Clone, FromRow)]
pub struct LogEvent {
    pub seq: i64,
    pub topic: String,
    pub partition_id: i64,
    pub key: String,
    pub payload: String,
    pub produced_at: DateTime<Utc>,
}

impl LogEvent {
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }
}

//--------------------------------------   CallbackLogEntry   --------------------------------------------------------
/// One webhook delivery attempt. Append-only; never mutated or deleted.
#[derive(Debug, Clone, FromRow)]
pub struct CallbackLogEntry {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub attempted_at: DateTime<Utc>,
    /// `None` when the request never produced an HTTP response (connect failure, timeout).
    pub http_status: Option<i64>,
    pub request_body: String,
    pub response_body: String,
}

#[derive(Debug, Clone)]
pub struct NewCallbackAttempt {
    pub transaction_id: TransactionId,
    pub http_status: Option<i64>,
    pub request_body: String,
    pub response_body: String,
}

//--------------------------------------    StatusOverride    --------------------------------------------------------
/// Audit record of an administrative status override.
#[derive(Debug, Clone, FromRow)]
pub struct StatusOverride {
    pub id: i64,
    pub transaction_id: TransactionId,
    pub admin_id: String,
    pub previous_status: TransactionStatus,
    pub new_status: TransactionStatus,
    pub justification: String,
    pub created_at: DateTime<Utc>,
}

/// An administrative override request. Overrides bypass the status dispatcher but go through the same atomic
/// ledger-plus-status unit, and require a justification for the audit trail.
#[derive(Debug, Clone)]
pub struct NewStatusOverride {
    pub transaction_id: TransactionId,
    pub admin_id: String,
    pub new_status: TransactionStatus,
    pub justification: String,
}

#[cfg(test)]
mod test {
    use super::TransactionStatus::*;
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Initiated.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Success));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Expired));
        assert!(Pending.can_transition_to(Canceled));
        assert!(Success.can_transition_to(Refunded));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Initiated.can_transition_to(Success));
        assert!(!Initiated.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Initiated));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Failed.can_transition_to(Refunded));
        assert!(!Expired.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Success));
        assert!(!Refunded.can_transition_to(Success));
        for s in [Initiated, Pending, Success, Failed, Expired, Canceled, Refunded] {
            assert!(!s.can_transition_to(s), "{s} → {s} must be rejected");
        }
    }

    #[test]
    fn ranks_are_monotonic_along_legal_paths() {
        for from in [Initiated, Pending, Success, Failed, Expired, Canceled, Refunded] {
            for to in [Initiated, Pending, Success, Failed, Expired, Canceled, Refunded] {
                if from.can_transition_to(to) {
                    assert!(to.rank() > from.rank(), "{from} → {to} must increase rank");
                }
            }
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for s in [Initiated, Pending, Success, Failed, Expired, Canceled, Refunded] {
            assert_eq!(s.to_string().parse::<TransactionStatus>().unwrap(), s);
        }
        assert!("PAID".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!Initiated.is_terminal());
        assert!(!Pending.is_terminal());
        for s in [Success, Failed, Expired, Canceled, Refunded] {
            assert!(s.is_terminal());
        }
    }
}
