use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::is_unique_violation;
use crate::{
    db_types::{
        Dispute,
        DisputeClaim,
        DisputeId,
        DisputeStatus,
        Fraction,
        NewClaim,
        NewDispute,
        TransactionId,
        UserId,
    },
    traits::EscrowError,
};

/// Inserts a new `open` dispute, unless the order already has a refund/resolution outcome or a settlement.
///
/// Returns `None` if those guards block the insert. A second unresolved dispute is rejected by the
/// `disputes_one_unresolved` index and reported as [`EscrowError::InvalidTransition`].
pub async fn insert_dispute(
    id: DisputeId,
    dispute: &NewDispute,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, EscrowError> {
    let result = sqlx::query_as(
        r#"
            INSERT INTO disputes (id, transaction_id, status, filed_by, reason, created_at, updated_at)
            SELECT $1, $2, 'open', $3, $4, $5, $5
            WHERE NOT EXISTS (SELECT 1 FROM status_events WHERE transaction_id = $2 AND stream = 'payment'
                              AND status IN ('refunded', 'resolved'))
              AND NOT EXISTS (SELECT 1 FROM settlements WHERE transaction_id = $2)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(dispute.transaction_id)
    .bind(dispute.filed_by)
    .bind(dispute.reason.as_str())
    .bind(at)
    .fetch_optional(conn)
    .await;
    match result {
        Ok(dispute) => Ok(dispute),
        Err(e) if is_unique_violation(&e) => Err(EscrowError::InvalidTransition(format!(
            "Transaction {} already has an unresolved dispute",
            dispute.transaction_id
        ))),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_dispute(id: &DisputeId, conn: &mut SqliteConnection) -> Result<Option<Dispute>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM disputes WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_recent_disputes(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<Dispute>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM disputes ORDER BY created_at DESC, rowid DESC LIMIT $1")
        .bind(limit)
        .fetch_all(conn)
        .await
}

pub async fn fetch_open_dispute(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM disputes WHERE transaction_id = $1 AND status <> 'resolved'")
        .bind(id)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_last_resolved_dispute(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM disputes WHERE transaction_id = $1 AND status = 'resolved' ORDER BY resolved_at DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Adds a claim, provided the dispute is not resolved. Returns `None` if the dispute is missing or resolved.
pub async fn insert_claim(
    claim: &NewClaim,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<DisputeClaim>, sqlx::Error> {
    let claim: Option<DisputeClaim> = sqlx::query_as(
        r#"
            INSERT INTO dispute_claims (dispute_id, author_id, role, body, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE EXISTS (SELECT 1 FROM disputes WHERE id = $1 AND status <> 'resolved')
            RETURNING *;
        "#,
    )
    .bind(claim.dispute_id)
    .bind(claim.author_id)
    .bind(claim.role)
    .bind(claim.body.as_str())
    .bind(at)
    .fetch_optional(conn)
    .await?;
    if let Some(c) = &claim {
        trace!("🗃️ Claim #{} added to dispute {} by {} ({})", c.id, c.dispute_id, c.author_id, c.role);
    }
    Ok(claim)
}

pub async fn fetch_claims(id: &DisputeId, conn: &mut SqliteConnection) -> Result<Vec<DisputeClaim>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM dispute_claims WHERE dispute_id = $1 ORDER BY id").bind(id).fetch_all(conn).await
}

/// `open → under_review`. Returns `None` if the dispute is not `open`.
pub async fn start_review(
    id: &DisputeId,
    resolver: &UserId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let dispute: Option<Dispute> = sqlx::query_as(
        r#"
            UPDATE disputes SET status = 'under_review', resolver_id = $2, updated_at = $3
            WHERE id = $1 AND status = 'open'
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(resolver)
    .bind(at)
    .fetch_optional(conn)
    .await?;
    if dispute.is_some() {
        debug!("🗃️ Dispute {id} is under review by {resolver}");
    }
    Ok(dispute)
}

/// Marks the dispute resolved. Only an unresolved dispute whose assigned resolver (if any) is `resolver` is updated.
/// Returns `None` if no row matched.
pub async fn mark_resolved(
    id: &DisputeId,
    resolver: &UserId,
    ratio: Fraction,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    sqlx::query_as(
        r#"
            UPDATE disputes
            SET status = $4, resolver_id = $2, refund_ratio = $3, updated_at = $5, resolved_at = $5
            WHERE id = $1 AND status <> 'resolved' AND (resolver_id IS NULL OR resolver_id = $2)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(resolver)
    .bind(ratio)
    .bind(DisputeStatus::Resolved)
    .bind(at)
    .fetch_optional(conn)
    .await
}
