//! The tunable business rules of the escrow engine, as stored in the `config` table.
use chrono::Duration;
use rust_decimal::Decimal;

use crate::db_types::VendorTier;

pub mod keys {
    pub const PENDING_DURATION: &str = "pending_duration";
    pub const COMPLETED_DURATION: &str = "completed_duration";
    pub const STUCK_DURATION: &str = "stuck_duration";
    pub const COMPLETION_TOLERANCE: &str = "completion_tolerance";
    pub const PARTIAL_REFUND_RESOLVER_PERCENT: &str = "partial_refund_resolver_percent";
    pub const GOLD_ACCOUNT_COMMISSION: &str = "gold_account_commission";
    pub const SILVER_ACCOUNT_COMMISSION: &str = "silver_account_commission";
    pub const BRONZE_ACCOUNT_COMMISSION: &str = "bronze_account_commission";
    pub const FREE_ACCOUNT_COMMISSION: &str = "free_account_commission";
}

/// Values written by `seed_defaults`, and used whenever a key is missing or unparsable.
pub const DEFAULT_CONFIG: [(&str, &str); 9] = [
    (keys::PENDING_DURATION, "24h"),
    (keys::COMPLETED_DURATION, "14d"),
    (keys::STUCK_DURATION, "7d"),
    (keys::COMPLETION_TOLERANCE, "0.05"),
    (keys::PARTIAL_REFUND_RESOLVER_PERCENT, "0.05"),
    (keys::GOLD_ACCOUNT_COMMISSION, "0.02"),
    (keys::SILVER_ACCOUNT_COMMISSION, "0.03"),
    (keys::BRONZE_ACCOUNT_COMMISSION, "0.04"),
    (keys::FREE_ACCOUNT_COMMISSION, "0.05"),
];

pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULT_CONFIG.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

pub fn commission_key(tier: VendorTier) -> &'static str {
    match tier {
        VendorTier::Gold => keys::GOLD_ACCOUNT_COMMISSION,
        VendorTier::Silver => keys::SILVER_ACCOUNT_COMMISSION,
        VendorTier::Bronze => keys::BRONZE_ACCOUNT_COMMISSION,
        VendorTier::Free => keys::FREE_ACCOUNT_COMMISSION,
    }
}

/// A snapshot of every tunable, taken once and then used for a whole projection, reconciliation pass or settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowPolicy {
    /// How long an order may wait for payment before it is stuck.
    pub pending_duration: Duration,
    /// How long a paid order may wait for delivery before it is stuck.
    pub completed_duration: Duration,
    /// How long an order may stay stuck before it is escalated for manual intervention.
    pub stuck_duration: Duration,
    /// Relative slack allowed between the observed deposit and the required amount.
    pub completion_tolerance: Decimal,
    /// The resolver's cut of the vendor's share in a dispute split.
    pub resolver_percent: Decimal,
    pub gold_commission: Decimal,
    pub silver_commission: Decimal,
    pub bronze_commission: Decimal,
    pub free_commission: Decimal,
}

impl Default for EscrowPolicy {
    fn default() -> Self {
        Self {
            pending_duration: Duration::hours(24),
            completed_duration: Duration::days(14),
            stuck_duration: Duration::days(7),
            completion_tolerance: Decimal::new(5, 2),
            resolver_percent: Decimal::new(5, 2),
            gold_commission: Decimal::new(2, 2),
            silver_commission: Decimal::new(3, 2),
            bronze_commission: Decimal::new(4, 2),
            free_commission: Decimal::new(5, 2),
        }
    }
}

impl EscrowPolicy {
    pub fn commission_rate(&self, tier: VendorTier) -> Decimal {
        match tier {
            VendorTier::Gold => self.gold_commission,
            VendorTier::Silver => self.silver_commission,
            VendorTier::Bronze => self.bronze_commission,
            VendorTier::Free => self.free_commission,
        }
    }
}
