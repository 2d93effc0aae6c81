use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Deposit,
        DepositHistory,
        EvmTransaction,
        NewDepositEntry,
        NewOrder,
        NewStatusEvent,
        StatusEvent,
        StoreId,
        Transaction,
        TransactionId,
        VendorTier,
    },
    projector::ProjectionError,
    settlement::SettlementError,
    traits::data_objects::{AppendGuard, AppendOutcome, CreatedOrder},
};

#[derive(Debug, Clone, Error)]
pub enum EscrowError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Transaction {0} does not exist")]
    TransactionNotFound(TransactionId),
    #[error("Dispute {0} does not exist")]
    DisputeNotFound(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Value out of domain: {0}")]
    OutOfDomain(String),
    #[error("Write was rejected because the order has moved on: {0}")]
    StaleWrite(String),
    #[error("Configuration value for '{0}' is missing or invalid")]
    ConfigMissing(String),
}

impl From<sqlx::Error> for EscrowError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EscrowError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        Self::DatabaseError(format!("Migration failed. {e}"))
    }
}

impl From<ProjectionError> for EscrowError {
    fn from(e: ProjectionError) -> Self {
        Self::DatabaseError(format!("Inconsistent event log. {e}"))
    }
}

impl From<SettlementError> for EscrowError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::OutOfDomain(s) => Self::OutOfDomain(s),
            SettlementError::InvalidTransition(s) => Self::InvalidTransition(s),
        }
    }
}

impl EscrowError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TransactionNotFound(_) | Self::DisputeNotFound(_))
    }
}

/// The storage contract for orders, their event log, and the per-store deposit ledger.
///
/// Every write to the event log goes through [`EscrowDatabase::append_status_event`], which checks its
/// [`AppendGuard`] and inserts in a single statement, so a concurrent writer can never slip an event in after a
/// terminal one.
#[allow(async_fn_in_trait)]
pub trait EscrowDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores the order, its funding record and the initial `pending` payment event in one atomic transaction.
    async fn insert_order(&self, order: NewOrder) -> Result<CreatedOrder, EscrowError>;

    /// Fetches the order with the given id. Soft-deleted orders are returned too.
    async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, EscrowError>;

    async fn fetch_evm_transaction(&self, id: &TransactionId) -> Result<Option<EvmTransaction>, EscrowError>;

    /// Sets the escrow address for an order. The address can be set exactly once; repeating the same address is a
    /// no-op, and a different address is rejected with [`EscrowError::InvalidTransition`].
    async fn assign_escrow_address(
        &self,
        id: &TransactionId,
        address: &str,
        at: DateTime<Utc>,
    ) -> Result<EvmTransaction, EscrowError>;

    /// Appends an event to the log if the guard allows it. A rejected write is not an error: it is reported as
    /// [`AppendOutcome::Ignored`].
    async fn append_status_event(
        &self,
        event: NewStatusEvent,
        guard: AppendGuard,
    ) -> Result<AppendOutcome, EscrowError>;

    /// All events for the order, in insertion order.
    async fn fetch_status_events(&self, id: &TransactionId) -> Result<Vec<StatusEvent>, EscrowError>;

    /// Returns the ids of up to `limit` orders that have not reached a terminal state, with ids strictly greater than
    /// `after`, ordered by id.
    async fn fetch_open_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError>;

    /// Returns the ids of up to `limit` orders that have not been deleted, with ids strictly greater than `after`,
    /// ordered by id.
    async fn fetch_transaction_ids(
        &self,
        after: Option<TransactionId>,
        limit: u32,
    ) -> Result<Vec<TransactionId>, EscrowError>;

    /// Marks the order as deleted. History is never removed.
    async fn soft_delete_order(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<Transaction, EscrowError>;

    /// The raw tier text stored for the store, if any. Parsing is left to the caller, since an unknown tier is only an
    /// error at settlement time.
    async fn fetch_vendor_tier(&self, store: &StoreId) -> Result<Option<String>, EscrowError>;

    async fn set_vendor_tier(&self, store: &StoreId, tier: VendorTier) -> Result<(), EscrowError>;

    /// Appends an entry to the store's deposit history and updates the running total in the same transaction.
    async fn credit_deposit(&self, entry: NewDepositEntry) -> Result<Deposit, EscrowError>;

    async fn fetch_deposits_for_store(&self, store: &StoreId) -> Result<Vec<Deposit>, EscrowError>;

    async fn fetch_deposit_history_for_store(&self, store: &StoreId) -> Result<Vec<DepositHistory>, EscrowError>;
}
