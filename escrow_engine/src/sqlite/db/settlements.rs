use sqlx::SqliteConnection;

use crate::{
    db_types::{Settlement, TransactionId},
    traits::NewSettlement,
};

/// Inserts the settlement unless the order already has one, or the order's state no longer allows it.
///
/// No settlement is written while a dispute is open. A commission settlement also requires that the order has no
/// refund or resolution outcome, and a dispute split requires one. The guard runs inside the insert statement, so a
/// dispute opened after the caller read the order's status still blocks the write. Returns `None` if the insert was
/// skipped for either reason.
pub async fn insert_if_absent(
    settlement: &NewSettlement,
    conn: &mut SqliteConnection,
) -> Result<Option<Settlement>, sqlx::Error> {
    sqlx::query_as(
        r#"
            INSERT INTO settlements (
                transaction_id,
                kind,
                amount,
                payout,
                commission,
                refund,
                tier,
                commission_rate,
                resolver_rate,
                refund_ratio,
                created_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
            WHERE NOT EXISTS (SELECT 1 FROM disputes WHERE transaction_id = $1 AND status <> 'resolved')
              AND (
                  ($2 = 'commission' AND NOT EXISTS (
                      SELECT 1 FROM status_events WHERE transaction_id = $1 AND stream = 'payment'
                      AND status IN ('refunded', 'resolved')))
                  OR ($2 = 'dispute_split' AND EXISTS (
                      SELECT 1 FROM status_events WHERE transaction_id = $1 AND stream = 'payment'
                      AND status IN ('refunded', 'resolved')))
              )
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(settlement.transaction_id)
    .bind(settlement.kind)
    .bind(settlement.amount)
    .bind(settlement.payout)
    .bind(settlement.commission)
    .bind(settlement.refund)
    .bind(settlement.tier)
    .bind(settlement.commission_rate)
    .bind(settlement.resolver_rate)
    .bind(settlement.refund_ratio)
    .bind(settlement.created_at)
    .fetch_optional(conn)
    .await
}

pub async fn fetch_settlement(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Settlement>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM settlements WHERE transaction_id = $1").bind(id).fetch_optional(conn).await
}
