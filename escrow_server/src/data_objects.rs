use std::fmt::Display;

use chrono::{DateTime, Utc};
use escrow_engine::db_types::{
    Amount,
    ChainStatus,
    ClaimRole,
    Deposit,
    DepositHistory,
    NewOrder,
    PackageId,
    ShippingStatus,
    StoreId,
    TransactionId,
    UserId,
    VendorTier,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

fn default_source() -> String {
    "api".to_string()
}

/// Body of `POST /api/orders`. The order is timestamped when the request is handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub package_id: PackageId,
    pub store_id: StoreId,
    pub buyer_id: UserId,
    pub required_amount: Amount,
    pub currency: String,
    pub chain_id: i64,
    #[serde(default)]
    pub refund_address: Option<String>,
}

impl NewOrderRequest {
    pub fn into_new_order(self, now: DateTime<Utc>) -> NewOrder {
        NewOrder {
            package_id: self.package_id,
            store_id: self.store_id,
            buyer_id: self.buyer_id,
            required_amount: self.required_amount,
            currency: self.currency,
            chain_id: self.chain_id,
            refund_address: self.refund_address,
            created_at: now,
        }
    }
}

/// Query string of `GET /api/orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListingQuery {
    #[serde(default)]
    pub after: Option<TransactionId>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Query string of `GET /api/disputes`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisputeListingQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowAddressRequest {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub amount: Amount,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingUpdate {
    pub status: ShippingStatus,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainUpdate {
    pub status: ChainStatus,
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDisputeRequest {
    pub filed_by: UserId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub author: UserId,
    pub role: ClaimRole,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub resolver: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub resolver: UserId,
    /// The share of the escrowed amount returned to the buyer, between 0 and 1.
    pub refund_ratio: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierRequest {
    pub tier: VendorTier,
}

/// A store's running totals together with every entry that contributed to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDeposits {
    pub store_id: StoreId,
    pub tier: VendorTier,
    pub deposits: Vec<Deposit>,
    pub history: Vec<DepositHistory>,
}
