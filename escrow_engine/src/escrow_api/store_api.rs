use std::{fmt::Debug, str::FromStr};

use log::*;

use crate::{
    db_types::{Deposit, DepositHistory, StoreId, VendorTier},
    traits::{EscrowDatabase, EscrowError},
};

/// Vendor tiers and the per-store deposit ledger.
pub struct StoreApi<B> {
    db: B,
}

impl<B> Debug for StoreApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreApi")
    }
}

impl<B> StoreApi<B>
where B: EscrowDatabase
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn set_vendor_tier(&self, store: &StoreId, tier: VendorTier) -> Result<(), EscrowError> {
        self.db.set_vendor_tier(store, tier).await?;
        info!("🔄️🏷️ Store {store} is now on the {tier} tier");
        Ok(())
    }

    /// The store's tier. Stores without an explicit tier are on the free tier.
    pub async fn vendor_tier(&self, store: &StoreId) -> Result<VendorTier, EscrowError> {
        match self.db.fetch_vendor_tier(store).await? {
            Some(raw) => {
                VendorTier::from_str(&raw).map_err(|e| EscrowError::OutOfDomain(format!("Store {store}: {e}")))
            },
            None => Ok(VendorTier::default()),
        }
    }

    /// The running deposit total for each currency the store has been paid in.
    pub async fn deposits_for_store(&self, store: &StoreId) -> Result<Vec<Deposit>, EscrowError> {
        self.db.fetch_deposits_for_store(store).await
    }

    pub async fn deposit_history_for_store(&self, store: &StoreId) -> Result<Vec<DepositHistory>, EscrowError> {
        self.db.fetch_deposit_history_for_store(store).await
    }
}
