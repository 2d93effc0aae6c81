use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use rust_decimal::Decimal;

use crate::{
    db_types::{ClaimRole, Dispute, DisputeClaim, DisputeId, Fraction, NewClaim, NewDispute, TransactionId, UserId},
    escrow_api::order_objects::DisputeDetails,
    events::{DisputeOpenedEvent, DisputeResolvedEvent, EventProducers, StatusChangedEvent},
    traits::{DisputeManagement, EscrowDatabase, EscrowError, ResolvedDispute},
};

/// The most disputes a single listing returns.
pub const MAX_DISPUTE_LISTING: u32 = 50;

/// Opens, reviews and resolves disputes. Resolution writes the order's terminal payment event.
pub struct DisputeApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for DisputeApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B> DisputeApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> DisputeApi<B>
where B: EscrowDatabase + DisputeManagement
{
    pub async fn open_dispute(
        &self,
        transaction_id: &TransactionId,
        filed_by: &UserId,
        reason: &str,
    ) -> Result<Dispute, EscrowError> {
        self.open_dispute_at(transaction_id, filed_by, reason, Utc::now()).await
    }

    /// Opens a dispute against the order. Only one unresolved dispute may exist per order, and none can be opened once
    /// the order has been refunded, resolved or settled.
    pub async fn open_dispute_at(
        &self,
        transaction_id: &TransactionId,
        filed_by: &UserId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<Dispute, EscrowError> {
        let tx = self
            .db
            .fetch_transaction(transaction_id)
            .await?
            .ok_or(EscrowError::TransactionNotFound(*transaction_id))?;
        if tx.is_deleted() {
            return Err(EscrowError::InvalidTransition(format!("Order {transaction_id} has been deleted")));
        }
        let new_dispute =
            NewDispute { transaction_id: *transaction_id, filed_by: *filed_by, reason: reason.trim().to_string() };
        let dispute = self.db.insert_dispute(new_dispute, at).await?;
        info!("⚖️ Dispute {} opened on order {transaction_id} by {filed_by}", dispute.id);
        self.producers.publish_dispute_opened(DisputeOpenedEvent { dispute: dispute.clone() }).await;
        Ok(dispute)
    }

    pub async fn add_claim(
        &self,
        dispute_id: &DisputeId,
        author: &UserId,
        role: ClaimRole,
        text: &str,
    ) -> Result<DisputeClaim, EscrowError> {
        self.add_claim_at(dispute_id, author, role, text, Utc::now()).await
    }

    pub async fn add_claim_at(
        &self,
        dispute_id: &DisputeId,
        author: &UserId,
        role: ClaimRole,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<DisputeClaim, EscrowError> {
        let body = text.trim();
        if body.is_empty() {
            return Err(EscrowError::OutOfDomain("A claim cannot be empty".to_string()));
        }
        let claim = NewClaim { dispute_id: *dispute_id, author_id: *author, role, body: body.to_string() };
        let claim = self.db.insert_claim(claim, at).await?;
        debug!("⚖️ {role} {author} added claim #{} to dispute {dispute_id}", claim.id);
        Ok(claim)
    }

    pub async fn start_review(&self, dispute_id: &DisputeId, resolver: &UserId) -> Result<Dispute, EscrowError> {
        self.start_review_at(dispute_id, resolver, Utc::now()).await
    }

    /// Assigns the resolver and moves the dispute from `open` to `under_review`.
    pub async fn start_review_at(
        &self,
        dispute_id: &DisputeId,
        resolver: &UserId,
        at: DateTime<Utc>,
    ) -> Result<Dispute, EscrowError> {
        let dispute = self.db.start_review(dispute_id, resolver, at).await?;
        info!("⚖️ Dispute {dispute_id} is now under review by {resolver}");
        Ok(dispute)
    }

    pub async fn resolve(
        &self,
        dispute_id: &DisputeId,
        resolver: &UserId,
        refund_ratio: Decimal,
    ) -> Result<ResolvedDispute, EscrowError> {
        self.resolve_at(dispute_id, resolver, refund_ratio, Utc::now()).await
    }

    /// Resolves the dispute with the given refund ratio and appends the order's terminal payment event: `refunded`
    /// for a ratio of one, `resolved` otherwise.
    ///
    /// If a resolver was assigned during review, only that resolver may resolve. Resolving twice fails with
    /// [`EscrowError::InvalidTransition`] and writes nothing.
    pub async fn resolve_at(
        &self,
        dispute_id: &DisputeId,
        resolver: &UserId,
        refund_ratio: Decimal,
        at: DateTime<Utc>,
    ) -> Result<ResolvedDispute, EscrowError> {
        let ratio = Fraction::new(refund_ratio).map_err(|e| EscrowError::OutOfDomain(format!("Refund ratio {e}")))?;
        let resolved = self.db.resolve_dispute(dispute_id, resolver, ratio, at).await?;
        info!(
            "⚖️ Dispute {dispute_id} resolved by {resolver} with refund ratio {ratio}. Order {} is {}",
            resolved.dispute.transaction_id, resolved.event.status
        );
        self.producers.publish_status_changed(StatusChangedEvent { event: resolved.event.clone() }).await;
        self.producers
            .publish_dispute_resolved(DisputeResolvedEvent {
                dispute: resolved.dispute.clone(),
                event: resolved.event.clone(),
            })
            .await;
        Ok(resolved)
    }

    pub async fn fetch_dispute(&self, dispute_id: &DisputeId) -> Result<DisputeDetails, EscrowError> {
        let dispute = self
            .db
            .fetch_dispute(dispute_id)
            .await?
            .ok_or_else(|| EscrowError::DisputeNotFound(dispute_id.to_string()))?;
        let claims = self.db.fetch_claims(dispute_id).await?;
        Ok(DisputeDetails { dispute, claims })
    }

    /// The most recently opened disputes, newest first. At most [`MAX_DISPUTE_LISTING`] are returned.
    pub async fn list_disputes(&self, limit: u32) -> Result<Vec<Dispute>, EscrowError> {
        let disputes = self.db.fetch_recent_disputes(limit.min(MAX_DISPUTE_LISTING)).await?;
        trace!("⚖️ Listed {} disputes", disputes.len());
        Ok(disputes)
    }

    pub async fn open_dispute_for_order(&self, transaction_id: &TransactionId) -> Result<Option<Dispute>, EscrowError> {
        self.db.fetch_open_dispute_for_transaction(transaction_id).await
    }
}
