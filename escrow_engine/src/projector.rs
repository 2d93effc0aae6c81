//! # Status projection
//!
//! Collapses an order's event streams into a single cumulative status. The projection is a pure function of
//! (events, open dispute, policy, now): it never touches the database and returns the same result for the same
//! inputs, so it can be re-run on every read.
//!
//! For each stream the current status is the event with the highest id. The cumulative status is chosen by the first
//! matching rule:
//!
//! 1. An unresolved dispute exists: `disputed`.
//! 2. Payment and shipping are both `completed`: `completed`.
//! 3. Payment has been `completed` for longer than `completed_duration` without shipping completing: `stuck`.
//! 4. Payment is `pending` and the order is older than `pending_duration`: `stuck`.
//! 5. Otherwise the payment status, except that a `completed` payment awaiting delivery is `awaiting_shipment`.
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{
        Amount,
        ChainStatus,
        CumulativeStatus,
        Dispute,
        EventStatus,
        PaymentStatus,
        ShippingStatus,
        StatusEvent,
        Transaction,
        TransactionId,
    },
    policy::EscrowPolicy,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("Event #{event_id} belongs to transaction {found}, not {expected}")]
    ForeignEvent { event_id: i64, expected: TransactionId, found: TransactionId },
    #[error("Transaction {0} has no payment events")]
    EmptyPaymentStream(TransactionId),
}

/// The precedence rule that produced a cumulative status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceRule {
    OpenDispute,
    Delivered,
    ShippingOverdue,
    PaymentOverdue,
    PaymentStatus,
}

/// The current status of one stream and the event that set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState<S> {
    pub status: S,
    pub event_id: i64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusProjection {
    pub transaction_id: TransactionId,
    pub status: CumulativeStatus,
    pub rule: PrecedenceRule,
    pub payment: StreamState<PaymentStatus>,
    pub shipping: Option<StreamState<ShippingStatus>>,
    pub chain: Option<StreamState<ChainStatus>>,
    /// The time of the latest event that contributed to the status. For a time-derived `stuck`, the instant the
    /// threshold was crossed.
    pub updated_at: DateTime<Utc>,
}

impl StatusProjection {
    /// The event that should be persisted so the event log reflects a time-derived `stuck`, if one is missing.
    pub fn overdue_event(&self) -> Option<EventStatus> {
        match self.rule {
            PrecedenceRule::PaymentOverdue if self.payment.status != PaymentStatus::Stuck => {
                Some(EventStatus::Payment(PaymentStatus::Stuck))
            },
            PrecedenceRule::ShippingOverdue
                if self.shipping.map(|s| s.status != ShippingStatus::Stuck).unwrap_or(true) =>
            {
                Some(EventStatus::Shipping(ShippingStatus::Stuck))
            },
            _ => None,
        }
    }

    pub fn stuck_since(&self) -> Option<DateTime<Utc>> {
        (self.status == CumulativeStatus::Stuck).then_some(self.updated_at)
    }

    /// True if the order has been stuck for longer than `stuck_duration` and needs manual attention.
    pub fn is_escalated(&self, policy: &EscrowPolicy, now: DateTime<Utc>) -> bool {
        self.stuck_since().map(|since| now - since > policy.stuck_duration).unwrap_or(false)
    }
}

fn latest<S: Copy>(events: &[StatusEvent], pick: impl Fn(&StatusEvent) -> Option<S>) -> Option<StreamState<S>> {
    events
        .iter()
        .filter_map(|e| pick(e).map(|status| StreamState { status, event_id: e.id, at: e.created_at }))
        .max_by_key(|s| s.event_id)
}

/// Computes the cumulative status of `transaction` from its events.
///
/// `open_dispute` must be the order's unresolved dispute, if it has one. Events may be supplied in any order.
pub fn project(
    transaction: &Transaction,
    events: &[StatusEvent],
    open_dispute: Option<&Dispute>,
    policy: &EscrowPolicy,
    now: DateTime<Utc>,
) -> Result<StatusProjection, ProjectionError> {
    if let Some(e) = events.iter().find(|e| e.transaction_id != transaction.id) {
        return Err(ProjectionError::ForeignEvent {
            event_id: e.id,
            expected: transaction.id,
            found: e.transaction_id,
        });
    }
    let payment = latest(events, StatusEvent::payment_status)
        .ok_or(ProjectionError::EmptyPaymentStream(transaction.id))?;
    let shipping = latest(events, StatusEvent::shipping_status);
    let chain = latest(events, StatusEvent::chain_status);

    let last_event_at = shipping.map(|s| s.at.max(payment.at)).unwrap_or(payment.at);
    let shipping_completed = shipping.map(|s| s.status == ShippingStatus::Completed).unwrap_or(false);

    let (status, rule, updated_at) = if let Some(dispute) = open_dispute {
        (CumulativeStatus::Disputed, PrecedenceRule::OpenDispute, last_event_at.max(dispute.created_at))
    } else if payment.status == PaymentStatus::Completed && shipping_completed {
        (CumulativeStatus::Completed, PrecedenceRule::Delivered, last_event_at)
    } else if payment.status == PaymentStatus::Completed && now - payment.at > policy.completed_duration {
        (CumulativeStatus::Stuck, PrecedenceRule::ShippingOverdue, payment.at + policy.completed_duration)
    } else if payment.status == PaymentStatus::Pending && now - transaction.created_at > policy.pending_duration {
        (CumulativeStatus::Stuck, PrecedenceRule::PaymentOverdue, transaction.created_at + policy.pending_duration)
    } else {
        let status = match payment.status {
            PaymentStatus::Pending => CumulativeStatus::Pending,
            PaymentStatus::Completed => CumulativeStatus::AwaitingShipment,
            PaymentStatus::Stuck => CumulativeStatus::Stuck,
            PaymentStatus::Refunded => CumulativeStatus::Refunded,
            PaymentStatus::Resolved => CumulativeStatus::Resolved,
        };
        (status, PrecedenceRule::PaymentStatus, last_event_at)
    };

    Ok(StatusProjection { transaction_id: transaction.id, status, rule, payment, shipping, chain, updated_at })
}

/// A deposit qualifies as payment in full if `|observed - required| / required <= tolerance`. The boundary itself
/// qualifies.
pub fn qualifies_as_completed(observed: Amount, required: Amount, tolerance: Decimal) -> bool {
    observed.relative_deviation_from(required).map(|deviation| deviation <= tolerance).unwrap_or(false)
}

/// The amount held in escrow: the observed amount on the order's payment `completed` event.
pub fn escrowed_amount(events: &[StatusEvent]) -> Option<Amount> {
    events
        .iter()
        .filter(|e| e.payment_status() == Some(PaymentStatus::Completed))
        .max_by_key(|e| e.id)
        .and_then(|e| e.amount)
}
