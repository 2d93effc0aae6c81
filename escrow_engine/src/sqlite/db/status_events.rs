//! The append-only event log. Nothing in this module updates or deletes a `status_events` row; the table's triggers
//! reject any attempt to.
use log::{debug, trace};
use sqlx::SqliteConnection;

use super::is_unique_violation;
use crate::{
    db_types::{NewStatusEvent, StatusEvent, TransactionId},
    traits::{AppendGuard, AppendOutcome, EscrowError, IgnoreReason},
};

const OUTCOME_RECORDED: &str = "EXISTS (SELECT 1 FROM status_events WHERE transaction_id = $1 AND stream = 'payment' \
                                AND status IN ('refunded', 'resolved'))";
const PAYMENT_TERMINAL: &str = "EXISTS (SELECT 1 FROM status_events WHERE transaction_id = $1 AND stream = 'payment' \
                                AND status IN ('completed', 'refunded', 'resolved'))";
const SHIPPING_COMPLETED: &str = "EXISTS (SELECT 1 FROM status_events WHERE transaction_id = $1 AND stream = \
                                  'shipping' AND status = 'completed')";
const DISPUTE_OPEN: &str = "EXISTS (SELECT 1 FROM disputes WHERE transaction_id = $1 AND status <> 'resolved')";

/// The SQL predicates that block an append, paired with the reason reported when they do.
fn blockers(guard: AppendGuard) -> Vec<(&'static str, IgnoreReason)> {
    match guard {
        AppendGuard::Payment => {
            vec![(PAYMENT_TERMINAL, IgnoreReason::Terminal), (DISPUTE_OPEN, IgnoreReason::Disputed)]
        },
        AppendGuard::Shipping => vec![
            (SHIPPING_COMPLETED, IgnoreReason::Terminal),
            (OUTCOME_RECORDED, IgnoreReason::Terminal),
            (DISPUTE_OPEN, IgnoreReason::Disputed),
        ],
        AppendGuard::Chain | AppendGuard::Resolution => vec![(OUTCOME_RECORDED, IgnoreReason::Terminal)],
    }
}

/// Inserts the event in a single `INSERT ... SELECT ... WHERE NOT ...` statement, so the guard is evaluated inside
/// the same write as the insert.
pub async fn guarded_insert(
    event: NewStatusEvent,
    guard: AppendGuard,
    conn: &mut SqliteConnection,
) -> Result<AppendOutcome, EscrowError> {
    let blockers = blockers(guard);
    let condition = blockers.iter().map(|(sql, _)| format!("NOT {sql}")).collect::<Vec<_>>().join(" AND ");
    let sql = format!(
        r#"
            INSERT INTO status_events (transaction_id, stream, status, amount, source, created_at)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE {condition}
            RETURNING *;
        "#
    );
    let result = sqlx::query_as::<_, StatusEvent>(&sql)
        .bind(event.transaction_id)
        .bind(event.status.stream())
        .bind(event.status.code())
        .bind(event.amount)
        .bind(event.source.as_deref())
        .bind(event.created_at)
        .fetch_optional(&mut *conn)
        .await;
    match result {
        Ok(Some(inserted)) => {
            debug!("🗃️ Event #{} [{}] appended for {}", inserted.id, inserted.status, inserted.transaction_id);
            Ok(AppendOutcome::appended(inserted))
        },
        Ok(None) => {
            let reason = blocking_reason(&event.transaction_id, &blockers, conn).await?;
            debug!("🗃️ Event [{}] for {} ignored: {reason}", event.status, event.transaction_id);
            Ok(AppendOutcome::ignored(reason))
        },
        Err(e) if is_unique_violation(&e) => {
            debug!("🗃️ Event [{}] for {} was already recorded", event.status, event.transaction_id);
            Ok(AppendOutcome::ignored(IgnoreReason::AlreadyRecorded))
        },
        Err(e) => Err(e.into()),
    }
}

async fn blocking_reason(
    id: &TransactionId,
    blockers: &[(&'static str, IgnoreReason)],
    conn: &mut SqliteConnection,
) -> Result<IgnoreReason, EscrowError> {
    for (sql, reason) in blockers {
        let blocked: bool = sqlx::query_scalar(&format!("SELECT {sql}")).bind(id).fetch_one(&mut *conn).await?;
        if blocked {
            return Ok(*reason);
        }
    }
    // The blocker has since cleared (e.g. a dispute was resolved), but the insert was rejected by it at the time.
    Ok(IgnoreReason::Terminal)
}

pub async fn fetch_events(id: &TransactionId, conn: &mut SqliteConnection) -> Result<Vec<StatusEvent>, sqlx::Error> {
    let events: Vec<StatusEvent> = sqlx::query_as("SELECT * FROM status_events WHERE transaction_id = $1 ORDER BY id")
        .bind(id)
        .fetch_all(conn)
        .await?;
    trace!("🗃️ {} events fetched for {id}", events.len());
    Ok(events)
}
