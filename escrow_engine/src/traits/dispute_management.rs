use chrono::{DateTime, Utc};

use crate::{
    db_types::{Dispute, DisputeClaim, DisputeId, Fraction, NewClaim, NewDispute, TransactionId, UserId},
    traits::{data_objects::ResolvedDispute, EscrowError},
};

/// Storage for disputes and their claims.
///
/// A dispute moves `open → under_review → resolved`, and `resolved` is final. At most one unresolved dispute exists
/// per order.
#[allow(async_fn_in_trait)]
pub trait DisputeManagement: Clone {
    /// Opens a dispute against the order.
    ///
    /// Fails with [`EscrowError::InvalidTransition`] if the order already has an unresolved dispute, has been
    /// refunded or resolved, or has already been settled.
    async fn insert_dispute(&self, dispute: NewDispute, at: DateTime<Utc>) -> Result<Dispute, EscrowError>;

    async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, EscrowError>;

    /// Up to `limit` disputes, newest first.
    async fn fetch_recent_disputes(&self, limit: u32) -> Result<Vec<Dispute>, EscrowError>;

    /// The unresolved (`open` or `under_review`) dispute for the order, if there is one.
    async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, EscrowError>;

    /// The most recently resolved dispute for the order, if there is one.
    async fn fetch_resolved_dispute_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Dispute>, EscrowError>;

    /// Adds a claim to a dispute that is not yet resolved.
    async fn insert_claim(&self, claim: NewClaim, at: DateTime<Utc>) -> Result<DisputeClaim, EscrowError>;

    async fn fetch_claims(&self, id: &DisputeId) -> Result<Vec<DisputeClaim>, EscrowError>;

    /// Moves an `open` dispute to `under_review`, assigning the resolver.
    async fn start_review(&self, id: &DisputeId, resolver: &UserId, at: DateTime<Utc>) -> Result<Dispute, EscrowError>;

    /// Resolves the dispute and appends the terminal payment event in a single database transaction.
    ///
    /// The event is `refunded` for a ratio of one and `resolved` otherwise. Resolving an already resolved dispute
    /// fails with [`EscrowError::InvalidTransition`] and writes nothing.
    async fn resolve_dispute(
        &self,
        id: &DisputeId,
        resolver: &UserId,
        refund_ratio: Fraction,
        at: DateTime<Utc>,
    ) -> Result<ResolvedDispute, EscrowError>;
}
