use chrono::{DateTime, Duration, Utc};
use escrow_engine::{
    db_types::{
        Amount,
        ConfigEntry,
        Deposit,
        DepositHistory,
        Dispute,
        DisputeClaim,
        DisputeId,
        EventStatus,
        EvmTransaction,
        Fraction,
        NewClaim,
        NewDepositEntry,
        NewDispute,
        NewOrder,
        NewStatusEvent,
        PackageId,
        PaymentStatus,
        Settlement,
        StatusEvent,
        StoreId,
        Transaction,
        TransactionId,
        UserId,
        VendorTier,
    },
    traits::{AppendGuard, AppendOutcome, CreatedOrder, NewSettlement, ResolvedDispute},
    ConfigStorage,
    DisputeManagement,
    EscrowDatabase,
    EscrowError,
    SettlementManagement,
};
use mockall::mock;

mock! {
    pub EscrowStore {}
    impl Clone for EscrowStore {
        fn clone(&self) -> Self;
    }
    impl EscrowDatabase for EscrowStore {
        fn url(&self) -> &str;
        async fn insert_order(&self, order: NewOrder) -> Result<CreatedOrder, EscrowError>;
        async fn fetch_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>, EscrowError>;
        async fn fetch_evm_transaction(&self, id: &TransactionId) -> Result<Option<EvmTransaction>, EscrowError>;
        async fn assign_escrow_address(&self, id: &TransactionId, address: &str, at: DateTime<Utc>) -> Result<EvmTransaction, EscrowError>;
        async fn append_status_event(&self, event: NewStatusEvent, guard: AppendGuard) -> Result<AppendOutcome, EscrowError>;
        async fn fetch_status_events(&self, id: &TransactionId) -> Result<Vec<StatusEvent>, EscrowError>;
        async fn fetch_open_transaction_ids(&self, after: Option<TransactionId>, limit: u32) -> Result<Vec<TransactionId>, EscrowError>;
        async fn fetch_transaction_ids(&self, after: Option<TransactionId>, limit: u32) -> Result<Vec<TransactionId>, EscrowError>;
        async fn soft_delete_order(&self, id: &TransactionId, at: DateTime<Utc>) -> Result<Transaction, EscrowError>;
        async fn fetch_vendor_tier(&self, store: &StoreId) -> Result<Option<String>, EscrowError>;
        async fn set_vendor_tier(&self, store: &StoreId, tier: VendorTier) -> Result<(), EscrowError>;
        async fn credit_deposit(&self, entry: NewDepositEntry) -> Result<Deposit, EscrowError>;
        async fn fetch_deposits_for_store(&self, store: &StoreId) -> Result<Vec<Deposit>, EscrowError>;
        async fn fetch_deposit_history_for_store(&self, store: &StoreId) -> Result<Vec<DepositHistory>, EscrowError>;
    }
    impl DisputeManagement for EscrowStore {
        async fn insert_dispute(&self, dispute: NewDispute, at: DateTime<Utc>) -> Result<Dispute, EscrowError>;
        async fn fetch_dispute(&self, id: &DisputeId) -> Result<Option<Dispute>, EscrowError>;
        async fn fetch_recent_disputes(&self, limit: u32) -> Result<Vec<Dispute>, EscrowError>;
        async fn fetch_open_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, EscrowError>;
        async fn fetch_resolved_dispute_for_transaction(&self, id: &TransactionId) -> Result<Option<Dispute>, EscrowError>;
        async fn insert_claim(&self, claim: NewClaim, at: DateTime<Utc>) -> Result<DisputeClaim, EscrowError>;
        async fn fetch_claims(&self, id: &DisputeId) -> Result<Vec<DisputeClaim>, EscrowError>;
        async fn start_review(&self, id: &DisputeId, resolver: &UserId, at: DateTime<Utc>) -> Result<Dispute, EscrowError>;
        async fn resolve_dispute(&self, id: &DisputeId, resolver: &UserId, refund_ratio: Fraction, at: DateTime<Utc>) -> Result<ResolvedDispute, EscrowError>;
    }
    impl SettlementManagement for EscrowStore {
        async fn fetch_settlement(&self, id: &TransactionId) -> Result<Option<Settlement>, EscrowError>;
        async fn insert_settlement(&self, settlement: NewSettlement, store: &StoreId) -> Result<(Settlement, bool), EscrowError>;
    }
    impl ConfigStorage for EscrowStore {
        async fn fetch_config_value(&self, key: &str) -> Result<Option<String>, EscrowError>;
        async fn fetch_all_config(&self) -> Result<Vec<ConfigEntry>, EscrowError>;
        async fn upsert_config_value(&self, key: &str, value: &str) -> Result<(), EscrowError>;
        async fn insert_config_if_absent(&self, key: &str, value: &str) -> Result<bool, EscrowError>;
    }
}

pub const ORDER_ID: &str = "0b6f1d3e-52a4-4c9b-8f1e-2d7c9a4e6b10";
pub const STORE_ID: &str = "7e2a9c41-0d6b-4f83-a5c2-91b8e3f4d725";
pub const DISPUTE_ID: &str = "c3d8e5f2-6a71-4b09-9e4d-58f0a2b7c136";
pub const BUYER_ID: &str = "1a4b7c2d-9e3f-4061-8b5a-c7d2e9f03a48";

pub fn order_id() -> TransactionId {
    ORDER_ID.parse().unwrap()
}

pub fn store_id() -> StoreId {
    STORE_ID.parse().unwrap()
}

pub fn dispute_id() -> DisputeId {
    DISPUTE_ID.parse().unwrap()
}

pub fn buyer_id() -> UserId {
    BUYER_ID.parse().unwrap()
}

/// A mock whose clones carry the same expectations, as the APIs each hold their own copy of the backend.
pub fn with_clones(configure: fn() -> MockEscrowStore) -> MockEscrowStore {
    let mut store = configure();
    store.expect_clone().returning(move || with_clones(configure));
    store.expect_fetch_config_value().returning(|_| Ok(None));
    store
}

/// When the order was created: an hour ago, so none of the default timeouts have run out.
pub fn created_at() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

pub fn transaction() -> Transaction {
    Transaction {
        id: order_id(),
        package_id: PackageId::random(),
        store_id: store_id(),
        buyer_id: buyer_id(),
        refund_address: None,
        created_at: created_at(),
        deleted_at: None,
    }
}

pub fn evm_transaction() -> EvmTransaction {
    EvmTransaction {
        transaction_id: order_id(),
        required_amount: Amount::from(100i64),
        currency: "USDC".to_string(),
        chain_id: 1,
        escrow_address: Some("0xe5c40000000000000000000000000000000000a1".to_string()),
        created_at: created_at(),
        updated_at: created_at(),
    }
}

pub fn payment_event(id: i64, status: PaymentStatus, created_at: DateTime<Utc>) -> StatusEvent {
    StatusEvent {
        id,
        transaction_id: order_id(),
        status: EventStatus::Payment(status),
        amount: (status == PaymentStatus::Completed).then(|| Amount::from(100i64)),
        source: Some("test".to_string()),
        created_at,
    }
}

/// The log of an order that was paid in full half an hour ago.
pub fn paid_order_events() -> Vec<StatusEvent> {
    vec![
        payment_event(1, PaymentStatus::Pending, created_at()),
        payment_event(2, PaymentStatus::Completed, Utc::now() - Duration::minutes(30)),
    ]
}

pub fn open_dispute() -> Dispute {
    Dispute {
        id: dispute_id(),
        transaction_id: order_id(),
        status: escrow_engine::db_types::DisputeStatus::Open,
        filed_by: buyer_id(),
        reason: "Item never arrived".to_string(),
        resolver_id: None,
        refund_ratio: None,
        created_at: Utc::now() - Duration::minutes(10),
        updated_at: Utc::now() - Duration::minutes(10),
        resolved_at: None,
    }
}
