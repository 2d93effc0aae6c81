use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        Amount,
        ChainStatus,
        CumulativeStatus,
        Dispute,
        DisputeClaim,
        EvmTransaction,
        PaymentStatus,
        ShippingStatus,
        StatusEvent,
        Transaction,
        TransactionId,
    },
    policy::EscrowPolicy,
    projector::{project, PrecedenceRule, StatusProjection},
    traits::{DisputeManagement, EscrowDatabase, EscrowError},
};

/// Everything known about one order at a point in time, together with its projected status.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub transaction: Transaction,
    pub evm_transaction: EvmTransaction,
    pub events: Vec<StatusEvent>,
    pub open_dispute: Option<Dispute>,
    pub projection: StatusProjection,
}

impl OrderSnapshot {
    pub async fn load<B>(
        db: &B,
        id: &TransactionId,
        policy: &EscrowPolicy,
        now: DateTime<Utc>,
    ) -> Result<Self, EscrowError>
    where
        B: EscrowDatabase + DisputeManagement,
    {
        let transaction = db.fetch_transaction(id).await?.ok_or(EscrowError::TransactionNotFound(*id))?;
        let evm_transaction = db
            .fetch_evm_transaction(id)
            .await?
            .ok_or_else(|| EscrowError::DatabaseError(format!("Order {id} has no funding record")))?;
        let events = db.fetch_status_events(id).await?;
        let open_dispute = db.fetch_open_dispute_for_transaction(id).await?;
        let projection = project(&transaction, &events, open_dispute.as_ref(), policy, now)?;
        Ok(Self { transaction, evm_transaction, events, open_dispute, projection })
    }

    pub fn status(&self) -> CumulativeStatus {
        self.projection.status
    }
}

/// The externally visible status of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub transaction_id: TransactionId,
    pub status: CumulativeStatus,
    pub rule: PrecedenceRule,
    pub required_amount: Amount,
    pub currency: String,
    pub escrow_address: Option<String>,
    pub escrow_address_pending: bool,
    pub payment: PaymentStatus,
    pub shipping: Option<ShippingStatus>,
    pub chain: Option<ChainStatus>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

impl From<&OrderSnapshot> for OrderStatusReport {
    fn from(snapshot: &OrderSnapshot) -> Self {
        let p = &snapshot.projection;
        Self {
            transaction_id: snapshot.transaction.id,
            status: p.status,
            rule: p.rule,
            required_amount: snapshot.evm_transaction.required_amount,
            currency: snapshot.evm_transaction.currency.clone(),
            escrow_address: snapshot.evm_transaction.escrow_address.clone(),
            escrow_address_pending: snapshot.evm_transaction.escrow_address_pending(),
            payment: p.payment.status,
            shipping: p.shipping.map(|s| s.status),
            chain: p.chain.map(|s| s.status),
            updated_at: p.updated_at,
            deleted: snapshot.transaction.is_deleted(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeDetails {
    pub dispute: Dispute,
    pub claims: Vec<DisputeClaim>,
}

/// A failed reconciliation step. The order is retried at the start of the next pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileFailure {
    pub transaction_id: TransactionId,
    pub reason: String,
}

/// The result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub started_at: DateTime<Utc>,
    /// Orders examined, including retries
    pub scanned: usize,
    /// Orders from the previous pass's retry queue
    pub retried: usize,
    /// Overdue events written
    pub appended: usize,
    /// Overdue events refused by the append guard because the order moved on concurrently
    pub ignored: usize,
    pub unchanged: usize,
    pub failed: Vec<ReconcileFailure>,
    /// Orders that have been stuck for longer than `stuck_duration`
    pub escalated: Vec<TransactionId>,
}

impl ReconcileReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            scanned: 0,
            retried: 0,
            appended: 0,
            ignored: 0,
            unchanged: 0,
            failed: Vec::new(),
            escalated: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
