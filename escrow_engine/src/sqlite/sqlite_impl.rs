//! `SqliteDatabase` is a concrete implementation of an escrow engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{config, db_url, deposits, disputes, new_pool, settlements, status_events, transactions};
use crate::{
    db_types::{
        ConfigEntry,
        Deposit,
        DepositHistory,
        Dispute,
        DisputeClaim,
        DisputeId,
        EvmTransaction,
        Fraction,
        NewClaim,
        NewDepositEntry,
        NewDispute,
        NewOrder,
        NewStatusEvent,
        PaymentStatus,
        Settlement,
        StatusEvent,
        StoreId,
        Transaction,
        TransactionId,
        UserId,
        VendorTier,
    },
    traits::{
        AppendGuard,
        AppendOutcome,
        ConfigStorage,
        CreatedOrder,
        DisputeManagement,
        EscrowDatabase,
        EscrowError,
        NewSettlement,
        ResolvedDispute,
        SettlementManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl EscrowDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<CreatedOrder, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let id = TransactionId::random();
        let (transaction, evm_transaction) = transactions::insert_order(id, &order, &mut tx).await?;
        let pending = NewStatusEvent::payment(id, PaymentStatus::Pending, order.created_at).with_source("order");
        let initial_event = match status_events::guarded_insert(pending, AppendGuard::Payment, &mut tx).await? {
            AppendOutcome::Appended { event } => event,
            AppendOutcome::Ignored { reason } => {
                let msg = format!("Initial event for new order {id} was rejected: {reason}");
                return Err(EscrowError::DatabaseError(msg));
            },
        };
        tx.commit().await?;
        debug!("🗃️ Order {id} has been saved in the DB with its initial pending status");
        Ok(CreatedOrder { transaction, evm_transaction, initial_event })
    }

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let tx = transactions::fetch_transaction(id, &mut conn).await?;
        Ok(tx)
    }

    async fn fetch_evm_transaction(&self, id: &TransactionId) -> Result<Option<EvmTransaction>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let evm = transactions::fetch_evm_transaction(id, &mut conn).await?;
        Ok(evm)
    }

    async fn assign_escrow_address(
        &self,
        id: &TransactionId,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<EvmTransaction, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        transactions::assign_escrow_address(id, address, at, &mut conn).await
    }

    async fn append_status_event(
        &self,
        event: NewStatusEvent,
        guard: AppendGuard,
    ) -> Result<AppendOutcome, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        status_events::guarded_insert(event, guard, &mut conn).await
    }

    async fn fetch_status_events(&self, id: &TransactionId) -> Result<Vec<StatusEvent>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let events = status_events::fetch_events(id, &mut conn).await?;
        Ok(events)
    }

    async fn fetch_open_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let ids = transactions::fetch_open_transaction_ids(after.as_ref(), limit, &mut conn).await?;
        Ok(ids)
    }

    async fn fetch_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let ids = transactions::fetch_transaction_ids(after.as_ref(), limit, &mut conn).await?;
        Ok(ids)
    }

    async fn soft_delete_order(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<Transaction, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        match transactions::soft_delete(id, at, &mut conn).await? {
            Some(tx) => {
                info!("🗃️ Order {id} has been soft-deleted");
                Ok(tx)
            },
            None => transactions::fetch_transaction(id, &mut conn).await?.ok_or(EscrowError::TransactionNotFound(*id)),
        }
    }

    async fn fetch_vendor_tier(&self, store: &StoreId) -> Result<Option<String>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let tier = transactions::fetch_vendor_tier(store, &mut conn).await?;
        Ok(tier)
    }

    async fn set_vendor_tier(&self, store: &StoreId, tier: VendorTier) -> Result<(), EscrowError> {
        let mut conn = self.pool.acquire().await?;
        transactions::upsert_vendor_tier(store, tier, Utc::now(), &mut conn).await?;
        Ok(())
    }

    async fn credit_deposit(&self, entry: NewDepositEntry) -> Result<Deposit, EscrowError> {
        let mut tx = self.pool.begin().await?;
        let deposit = deposits::credit(&entry, &mut tx).await?;
        tx.commit().await?;
        Ok(deposit)
    }

    async fn fetch_deposits_for_store(&self, store: &StoreId) -> Result<Vec<Deposit>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let deposits = deposits::fetch_deposits(store, &mut conn).await?;
        Ok(deposits)
    }

    async fn fetch_deposit_history_for_store(&self, store: &StoreId) -> Result<Vec<DepositHistory>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let history = deposits::fetch_history(store, &mut conn).await?;
        Ok(history)
    }
}

impl DisputeManagement for SqliteDatabase {
    async fn insert_dispute(&self, dispute: NewDispute, at: DateTime<Utc>) -> Result<Dispute, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let id = DisputeId::random();
        let inserted = disputes::insert_dispute(id, &dispute, at, &mut conn).await?;
        inserted.ok_or_else(|| {
            EscrowError::InvalidTransition(format!(
                "Transaction {} has already been refunded, resolved or settled",
                dispute.transaction_id
            ))
        })
    }

    async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_dispute(id, &mut conn).await?;
        Ok(dispute)
    }

    async fn fetch_recent_disputes(&self, limit: u32) -> Result<Vec<Dispute>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let disputes = disputes::fetch_recent_disputes(limit, &mut conn).await?;
        Ok(disputes)
    }

    async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_open_dispute(id, &mut conn).await?;
        Ok(dispute)
    }

    async fn fetch_resolved_dispute_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Dispute>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let dispute = disputes::fetch_last_resolved_dispute(id, &mut conn).await?;
        Ok(dispute)
    }

    async fn insert_claim(&self, claim: NewClaim, at: DateTime<Utc>) -> Result<DisputeClaim, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(inserted) = disputes::insert_claim(&claim, at, &mut conn).await? {
            return Ok(inserted);
        }
        match disputes::fetch_dispute(&claim.dispute_id, &mut conn).await? {
            None => Err(EscrowError::DisputeNotFound(claim.dispute_id.to_string())),
            Some(_) => Err(EscrowError::InvalidTransition(format!(
                "Dispute {} is resolved and accepts no further claims",
                claim.dispute_id
            ))),
        }
    }

    async fn fetch_claims(&self, id: &DisputeId) -> Result<Vec<DisputeClaim>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let claims = disputes::fetch_claims(id, &mut conn).await?;
        Ok(claims)
    }

    async fn start_review(&self, id: &DisputeId, resolver: &UserId, at: DateTime<Utc>) -> Result<Dispute, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        if let Some(dispute) = disputes::start_review(id, resolver, at, &mut conn).await? {
            return Ok(dispute);
        }
        match disputes::fetch_dispute(id, &mut conn).await? {
            None => Err(EscrowError::DisputeNotFound(id.to_string())),
            Some(d) => Err(EscrowError::InvalidTransition(format!(
                "Dispute {id} is {} and cannot be put under review",
                d.status
            ))),
        }
    }

    async fn resolve_dispute(
        &self,
        id: &DisputeId,
        resolver: &UserId,
        refund_ratio: Fraction,
        at: DateTime<Utc>,
    ) -> Result<ResolvedDispute, EscrowError> {
        // The dispute row is updated first so that this transaction holds the write lock before it reads anything.
        let mut tx = self.pool.begin().await?;
        let dispute = match disputes::mark_resolved(id, resolver, refund_ratio, at, &mut tx).await? {
            Some(d) => d,
            None => {
                let existing = disputes::fetch_dispute(id, &mut tx).await?;
                tx.rollback().await?;
                return Err(match existing {
                    None => EscrowError::DisputeNotFound(id.to_string()),
                    Some(d) if d.status.is_terminal() => {
                        EscrowError::InvalidTransition(format!("Dispute {id} has already been resolved"))
                    },
                    Some(d) => EscrowError::InvalidTransition(format!(
                        "Dispute {id} is assigned to {}. {resolver} may not resolve it",
                        d.resolver_id.map(|r| r.to_string()).unwrap_or_default()
                    )),
                });
            },
        };
        let status = if refund_ratio.is_one() { PaymentStatus::Refunded } else { PaymentStatus::Resolved };
        let event =
            NewStatusEvent::payment(dispute.transaction_id, status, at).with_source(format!("dispute:{id}"));
        match status_events::guarded_insert(event, AppendGuard::Resolution, &mut tx).await? {
            AppendOutcome::Appended { event } => {
                tx.commit().await?;
                info!("🗃️ Dispute {id} resolved with a refund ratio of {refund_ratio}. Order is now {status}");
                Ok(ResolvedDispute { dispute, event })
            },
            AppendOutcome::Ignored { reason } => {
                tx.rollback().await?;
                warn!("🗃️ Dispute {id} could not be resolved: {reason}");
                Err(EscrowError::InvalidTransition(format!(
                    "Transaction {} already has a final outcome",
                    dispute.transaction_id
                )))
            },
        }
    }
}

impl SettlementManagement for SqliteDatabase {
    async fn fetch_settlement(&self, id: &TransactionId) -> Result<Option<Settlement>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let settlement = settlements::fetch_settlement(id, &mut conn).await?;
        Ok(settlement)
    }

    async fn insert_settlement(
        &self,
        settlement: NewSettlement,
        store: &StoreId,
    ) -> Result<(Settlement, bool), EscrowError> {
        let mut tx = self.pool.begin().await?;
        let id = settlement.transaction_id;
        let Some(row) = settlements::insert_if_absent(&settlement, &mut tx).await? else {
            let existing = settlements::fetch_settlement(&id, &mut tx).await?;
            tx.rollback().await?;
            return match existing {
                Some(s) => {
                    debug!("🗃️ Order {id} was already settled");
                    Ok((s, false))
                },
                None => {
                    warn!("🗃️ {} settlement for order {id} refused. The order changed state.", settlement.kind);
                    Err(EscrowError::InvalidTransition(format!(
                        "Order {id} cannot be settled as a {}. It has an open dispute or its outcome changed",
                        settlement.kind
                    )))
                },
            };
        };
        if row.payout.is_positive() {
            let entry = NewDepositEntry {
                store_id: *store,
                currency: settlement.currency.clone(),
                amount: row.payout,
                transaction_id: Some(id),
                memo: Some(format!("{} payout", row.kind)),
                created_at: settlement.created_at,
            };
            deposits::credit(&entry, &mut tx).await?;
        }
        tx.commit().await?;
        info!(
            "🗃️ Order {id} settled. Payout: {}, commission: {}, refund: {}",
            row.payout, row.commission, row.refund
        );
        Ok((row, true))
    }
}

impl ConfigStorage for SqliteDatabase {
    async fn fetch_config_value(&self, key: &str) -> Result<Option<String>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let value = config::fetch_value(key, &mut conn).await?;
        Ok(value)
    }

    async fn fetch_all_config(&self) -> Result<Vec<ConfigEntry>, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let entries = config::fetch_all(&mut conn).await?;
        Ok(entries)
    }

    async fn upsert_config_value(&self, key: &str, value: &str) -> Result<(), EscrowError> {
        let mut conn = self.pool.acquire().await?;
        config::upsert(key, value, &mut conn).await?;
        Ok(())
    }

    async fn insert_config_if_absent(&self, key: &str, value: &str) -> Result<bool, EscrowError> {
        let mut conn = self.pool.acquire().await?;
        let inserted = config::insert_if_absent(key, value, &mut conn).await?;
        Ok(inserted)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `ESC_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date with the embedded migrations.
    pub async fn migrate(&self) -> Result<(), EscrowError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&mut self) {
        self.pool.close().await;
    }
}
