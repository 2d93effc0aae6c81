//! A backend that wraps the SQLite database and misbehaves for one chosen order.
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use escrow_engine::{
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
        StatusEvent,
        StoreId,
        Transaction,
        TransactionId,
        UserId,
        VendorTier,
    },
    traits::{AppendGuard, AppendOutcome, CreatedOrder, ResolvedDispute},
    ConfigStorage,
    DisputeManagement,
    EscrowDatabase,
    EscrowError,
    SqliteDatabase,
};

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Reading the order fails
    Fail,
    /// Reading the order takes this long
    Stall(Duration),
}

#[derive(Clone)]
pub struct FaultyBackend {
    inner: SqliteDatabase,
    fault: Arc<RwLock<Option<(TransactionId, Fault)>>>,
}

impl FaultyBackend {
    pub fn new(inner: SqliteDatabase) -> Self {
        Self { inner, fault: Arc::new(RwLock::new(None)) }
    }

    pub fn inject(&self, id: TransactionId, fault: Fault) {
        *self.fault.write().unwrap() = Some((id, fault));
    }

    pub fn heal(&self) {
        *self.fault.write().unwrap() = None;
    }

    fn fault_for(&self, id: &TransactionId) -> Option<Fault> {
        match *self.fault.read().unwrap() {
            Some((faulty, fault)) if &faulty == id => Some(fault),
            _ => None,
        }
    }
}

impl EscrowDatabase for FaultyBackend {
    fn url(&self) -> &str {
        self.inner.url()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<CreatedOrder, EscrowError> {
        self.inner.insert_order(order).await
    }

    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, EscrowError> {
        match self.fault_for(id) {
            Some(Fault::Fail) => Err(EscrowError::DatabaseError(format!("Disk read error for {id}"))),
            Some(Fault::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                self.inner.fetch_transaction(id).await
            },
            None => self.inner.fetch_transaction(id).await,
        }
    }

    async fn fetch_evm_transaction(&self, id: &TransactionId) -> Result<Option<EvmTransaction>, EscrowError> {
        self.inner.fetch_evm_transaction(id).await
    }

    async fn assign_escrow_address(
        &self,
        id: &TransactionId,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<EvmTransaction, EscrowError> {
        self.inner.assign_escrow_address(id, address, at).await
    }

    async fn append_status_event(
        &self,
        event: NewStatusEvent,
        guard: AppendGuard,
    ) -> Result<AppendOutcome, EscrowError> {
        self.inner.append_status_event(event, guard).await
    }

    async fn fetch_status_events(&self, id: &TransactionId) -> Result<Vec<StatusEvent>, EscrowError> {
        self.inner.fetch_status_events(id).await
    }

    async fn fetch_open_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError> {
        self.inner.fetch_open_transaction_ids(after, limit).await
    }

    async fn fetch_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError> {
        self.inner.fetch_transaction_ids(after, limit).await
    }

    async fn soft_delete_order(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<Transaction, EscrowError> {
        self.inner.soft_delete_order(id, at).await
    }

    async fn fetch_vendor_tier(&self, store: &StoreId) -> Result<Option<String>, EscrowError> {
        self.inner.fetch_vendor_tier(store).await
    }

    async fn set_vendor_tier(&self, store: &StoreId, tier: VendorTier) -> Result<(), EscrowError> {
        self.inner.set_vendor_tier(store, tier).await
    }

    async fn credit_deposit(&self, entry: NewDepositEntry) -> Result<Deposit, EscrowError> {
        self.inner.credit_deposit(entry).await
    }

    async fn fetch_deposits_for_store(&self, store: &StoreId) -> Result<Vec<Deposit>, EscrowError> {
        self.inner.fetch_deposits_for_store(store).await
    }

    async fn fetch_deposit_history_for_store(&self, store: &StoreId) -> Result<Vec<DepositHistory>, EscrowError> {
        self.inner.fetch_deposit_history_for_store(store).await
    }
}

impl DisputeManagement for FaultyBackend {
    async fn insert_dispute(&self, dispute: NewDispute, at: DateTime<Utc>) -> Result<Dispute, EscrowError> {
        self.inner.insert_dispute(dispute, at).await
    }

    async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, EscrowError> {
        self.inner.fetch_dispute(id).await
    }

    async fn fetch_recent_disputes(&self, limit: u32) -> Result<Vec<Dispute>, EscrowError> {
        self.inner.fetch_recent_disputes(limit).await
    }

    async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, EscrowError> {
        self.inner.fetch_open_dispute_for_transaction(id).await
    }

    async fn fetch_resolved_dispute_for_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<Dispute>, EscrowError> {
        self.inner.fetch_resolved_dispute_for_transaction(id).await
    }

    async fn insert_claim(&self, claim: NewClaim, at: DateTime<Utc>) -> Result<DisputeClaim, EscrowError> {
        self.inner.insert_claim(claim, at).await
    }

    async fn fetch_claims(&self, id: &DisputeId) -> Result<Vec<DisputeClaim>, EscrowError> {
        self.inner.fetch_claims(id).await
    }

    async fn start_review(&self, id: &DisputeId, resolver: &UserId, at: DateTime<Utc>) -> Result<Dispute, EscrowError> {
        self.inner.start_review(id, resolver, at).await
    }

    async fn resolve_dispute(
        &self,
        id: &DisputeId,
        resolver: &UserId,
        refund_ratio: Fraction,
        at: DateTime<Utc>,
    ) -> Result<ResolvedDispute, EscrowError> {
        self.inner.resolve_dispute(id, resolver, refund_ratio, at).await
    }
}

impl ConfigStorage for FaultyBackend {
    async fn fetch_config_value(&self, key: &str) -> Result<Option<String>, EscrowError> {
        self.inner.fetch_config_value(key).await
    }

    async fn fetch_all_config(&self) -> Result<Vec<ConfigEntry>, EscrowError> {
        self.inner.fetch_all_config().await
    }

    async fn upsert_config_value(&self, key: &str, value: &str) -> Result<(), EscrowError> {
        self.inner.upsert_config_value(key, value).await
    }

    async fn insert_config_if_absent(&self, key: &str, value: &str) -> Result<bool, EscrowError> {
        self.inner.insert_config_if_absent(key, value).await
    }
}
