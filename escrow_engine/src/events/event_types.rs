use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Dispute, Settlement, StatusEvent, TransactionId},
    projector::StatusProjection,
    traits::CreatedOrder,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: CreatedOrder,
}

/// Emitted whenever an event is appended to an order's log, whichever API wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub event: StatusEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeOpenedEvent {
    pub dispute: Dispute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeResolvedEvent {
    pub dispute: Dispute,
    pub event: StatusEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettledEvent {
    pub settlement: Settlement,
}

/// An order has been stuck for longer than `stuck_duration` and needs manual intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEscalatedEvent {
    pub transaction_id: TransactionId,
    pub stuck_since: DateTime<Utc>,
    pub projection: StatusProjection,
}
