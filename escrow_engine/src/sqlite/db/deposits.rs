use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Amount, Deposit, DepositHistory, NewDepositEntry, StoreId},
    traits::EscrowError,
};

/// Appends a history entry and recomputes the store's running total from the full history.
///
/// Not atomic on its own. Run it inside a transaction so the total and the history cannot diverge.
pub async fn credit(entry: &NewDepositEntry, conn: &mut SqliteConnection) -> Result<Deposit, EscrowError> {
    let row: DepositHistory = sqlx::query_as(
        r#"
            INSERT INTO deposit_history (store_id, currency, amount, transaction_id, memo, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(entry.store_id)
    .bind(entry.currency.as_str())
    .bind(entry.amount)
    .bind(entry.transaction_id)
    .bind(entry.memo.as_deref())
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;
    // Amounts are stored as text, so they are summed here rather than in SQL.
    let amounts: Vec<Amount> =
        sqlx::query_scalar("SELECT amount FROM deposit_history WHERE store_id = $1 AND currency = $2")
            .bind(entry.store_id)
            .bind(entry.currency.as_str())
            .fetch_all(&mut *conn)
            .await?;
    let total = Amount::checked_sum(amounts).ok_or_else(|| {
        EscrowError::OutOfDomain(format!(
            "The {} balance of store {} would exceed the largest representable amount",
            entry.currency, entry.store_id
        ))
    })?;
    let deposit: Deposit = sqlx::query_as(
        r#"
            INSERT INTO deposits (store_id, currency, total, updated_at) VALUES ($1, $2, $3, $4)
            ON CONFLICT (store_id, currency) DO UPDATE SET total = excluded.total, updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(entry.store_id)
    .bind(entry.currency.as_str())
    .bind(total)
    .bind(entry.created_at)
    .fetch_one(conn)
    .await?;
    debug!(
        "🗃️ Deposit #{} of {} {} credited to store {}. Total is now {total}",
        row.id, row.amount, row.currency, row.store_id
    );
    Ok(deposit)
}

pub async fn fetch_deposits(store: &StoreId, conn: &mut SqliteConnection) -> Result<Vec<Deposit>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM deposits WHERE store_id = $1 ORDER BY currency").bind(store).fetch_all(conn).await
}

pub async fn fetch_history(store: &StoreId, conn: &mut SqliteConnection) -> Result<Vec<DepositHistory>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM deposit_history WHERE store_id = $1 ORDER BY id").bind(store).fetch_all(conn).await
}
