use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{EvmTransaction, NewOrder, StoreId, Transaction, TransactionId, VendorTier},
    traits::EscrowError,
};

/// Inserts the order row and its funding row. This is not atomic: embed the call in a transaction and pass
/// `&mut *tx` as the connection argument.
pub async fn insert_order(
    id: TransactionId,
    order: &NewOrder,
    conn: &mut SqliteConnection,
) -> Result<(Transaction, EvmTransaction), EscrowError> {
    let transaction: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (id, package_id, store_id, buyer_id, refund_address, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(order.package_id)
    .bind(order.store_id)
    .bind(order.buyer_id)
    .bind(order.refund_address.as_deref())
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await?;
    let evm: EvmTransaction = sqlx::query_as(
        r#"
            INSERT INTO evm_transactions (transaction_id, required_amount, currency, chain_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(order.required_amount)
    .bind(order.currency.as_str())
    .bind(order.chain_id)
    .bind(order.created_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {id} inserted, requiring {} {}", evm.required_amount, evm.currency);
    Ok((transaction, evm))
}

pub async fn fetch_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_evm_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<EvmTransaction>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM evm_transactions WHERE transaction_id = $1").bind(id).fetch_optional(conn).await
}

/// Sets the escrow address if it has not been set. Returns the row as it stands afterwards.
pub async fn assign_escrow_address(
    id: &TransactionId,
    address: &str,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<EvmTransaction, EscrowError> {
    let updated: Option<EvmTransaction> = sqlx::query_as(
        r#"
            UPDATE evm_transactions SET escrow_address = $2, updated_at = $3
            WHERE transaction_id = $1 AND escrow_address IS NULL
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(address)
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(evm) = updated {
        debug!("🗃️ Escrow address {address} assigned to order {id}");
        return Ok(evm);
    }
    let existing = fetch_evm_transaction(id, conn).await?.ok_or(EscrowError::TransactionNotFound(*id))?;
    match existing.escrow_address.as_deref() {
        Some(a) if a == address => {
            trace!("🗃️ Order {id} already has escrow address {address}");
            Ok(existing)
        },
        Some(a) => Err(EscrowError::InvalidTransition(format!(
            "Order {id} already has escrow address {a}. It cannot be changed to {address}"
        ))),
        None => Err(EscrowError::DatabaseError(format!("Escrow address for {id} could not be assigned"))),
    }
}

/// Keyset-paginated scan over the ids in `v_open_transactions`.
///
/// Only the id column is decoded, so a row with a corrupt column elsewhere still shows up here and fails on its own
/// when the order is loaded.
pub async fn fetch_open_transaction_ids(
    after: Option<&TransactionId>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionId>, sqlx::Error> {
    let ids: Vec<TransactionId> = match after {
        Some(after) => {
            sqlx::query_scalar("SELECT id FROM v_open_transactions WHERE id > $1 ORDER BY id LIMIT $2")
                .bind(after)
                .bind(limit)
                .fetch_all(conn)
                .await?
        },
        None => {
            sqlx::query_scalar("SELECT id FROM v_open_transactions ORDER BY id LIMIT $1")
                .bind(limit)
                .fetch_all(conn)
                .await?
        },
    };
    trace!("🗃️ Fetched {} open transaction ids", ids.len());
    Ok(ids)
}

/// Keyset-paginated scan over the ids of orders that have not been deleted.
pub async fn fetch_transaction_ids(
    after: Option<&TransactionId>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionId>, sqlx::Error> {
    let ids: Vec<TransactionId> = match after {
        Some(after) => {
            sqlx::query_scalar(
                "SELECT id FROM transactions WHERE deleted_at IS NULL AND id > $1 ORDER BY id LIMIT $2",
            )
            .bind(after)
            .bind(limit)
            .fetch_all(conn)
            .await?
        },
        None => {
            sqlx::query_scalar("SELECT id FROM transactions WHERE deleted_at IS NULL ORDER BY id LIMIT $1")
                .bind(limit)
                .fetch_all(conn)
                .await?
        },
    };
    trace!("🗃️ Fetched {} transaction ids", ids.len());
    Ok(ids)
}

pub async fn soft_delete(
    id: &TransactionId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    sqlx::query_as("UPDATE transactions SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING *")
        .bind(id)
        .bind(at)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_vendor_tier(store: &StoreId, conn: &mut SqliteConnection) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT tier FROM vendor_tiers WHERE store_id = $1").bind(store).fetch_optional(conn).await
}

pub async fn upsert_vendor_tier(
    store: &StoreId,
    tier: VendorTier,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO vendor_tiers (store_id, tier, updated_at) VALUES ($1, $2, $3)
            ON CONFLICT (store_id) DO UPDATE SET tier = excluded.tier, updated_at = excluded.updated_at;
        "#,
    )
    .bind(store)
    .bind(tier)
    .bind(at)
    .execute(conn)
    .await?;
    debug!("🗃️ Store {store} is now on the {tier} tier");
    Ok(())
}
