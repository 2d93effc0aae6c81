use crate::{
    db_types::{Settlement, StoreId, TransactionId},
    traits::{data_objects::NewSettlement, EscrowError},
};

#[allow(async_fn_in_trait)]
pub trait SettlementManagement: Clone {
    async fn fetch_settlement(&self, id: &TransactionId) -> Result<Option<Settlement>, EscrowError>;

    /// Stores the settlement and credits the payout to the vendor's deposit ledger atomically.
    ///
    /// If the order was already settled, nothing is written and the stored settlement is returned. The boolean is
    /// `true` when this call created the row.
    ///
    /// The order's state is checked again as part of the write. An order with an open dispute cannot be settled,
    /// and neither can a commission settlement for an order that has a refund or resolution outcome. Both fail with
    /// [`EscrowError::InvalidTransition`].
    async fn insert_settlement(
        &self,
        settlement: NewSettlement,
        store: &StoreId,
    ) -> Result<(Settlement, bool), EscrowError>;
}
