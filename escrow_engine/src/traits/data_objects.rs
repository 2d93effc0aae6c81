use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Amount,
    Dispute,
    EvmTransaction,
    Fraction,
    SettlementKind,
    StatusEvent,
    Transaction,
    TransactionId,
    VendorTier,
};

/// The condition under which an event may be appended to the log.
///
/// The check and the insert happen in one SQL statement, so the guard holds even with concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendGuard {
    /// Deposits and scheduler updates on the payment stream. Blocked once the payment stream is terminal
    /// (`completed`, `refunded` or `resolved`) or while a dispute is open.
    Payment,
    /// Blocked once shipping has completed, the order has a refund/resolution outcome, or a dispute is open.
    Shipping,
    /// Chain confirmations. Blocked only by a refund/resolution outcome.
    Chain,
    /// The terminal event written by a dispute resolution. Blocked by an existing refund/resolution outcome.
    Resolution,
}

impl Display for AppendGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppendGuard::Payment => write!(f, "payment"),
            AppendGuard::Shipping => write!(f, "shipping"),
            AppendGuard::Chain => write!(f, "chain"),
            AppendGuard::Resolution => write!(f, "resolution"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// The stream (or the whole order) has already reached a terminal status.
    Terminal,
    /// A dispute is open against the order.
    Disputed,
    /// An identical terminal event was recorded concurrently.
    AlreadyRecorded,
}

impl Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Terminal => write!(f, "the order is in a terminal state"),
            IgnoreReason::Disputed => write!(f, "the order has an open dispute"),
            IgnoreReason::AlreadyRecorded => write!(f, "the event was already recorded"),
        }
    }
}

/// The result of a guarded append. `Ignored` is a stale write and is never treated as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended { event: StatusEvent },
    Ignored { reason: IgnoreReason },
}

impl AppendOutcome {
    pub fn appended(event: StatusEvent) -> Self {
        Self::Appended { event }
    }

    pub fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }

    pub fn is_appended(&self) -> bool {
        matches!(self, Self::Appended { .. })
    }

    pub fn event(&self) -> Option<&StatusEvent> {
        match self {
            Self::Appended { event } => Some(event),
            Self::Ignored { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub transaction: Transaction,
    pub evm_transaction: EvmTransaction,
    pub initial_event: StatusEvent,
}

impl CreatedOrder {
    pub fn id(&self) -> TransactionId {
        self.transaction.id
    }

    /// Always true straight after creation. The address is assigned later.
    pub fn escrow_address_pending(&self) -> bool {
        self.evm_transaction.escrow_address_pending()
    }
}

/// The result of resolving a dispute: the updated dispute and the terminal payment event it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDispute {
    pub dispute: Dispute,
    pub event: StatusEvent,
}

/// A settlement ready to be stored, along with the deposit credit it implies for the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettlement {
    pub transaction_id: TransactionId,
    pub kind: SettlementKind,
    pub amount: Amount,
    pub payout: Amount,
    pub commission: Amount,
    pub refund: Amount,
    pub tier: Option<VendorTier>,
    pub commission_rate: Option<Fraction>,
    pub resolver_rate: Option<Fraction>,
    pub refund_ratio: Option<Fraction>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}
