use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use escrow_common::{Amount, DisputeId, Fraction, PackageId, StoreId, TransactionId, UserId};
use escrow_common::sql_text;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a fieldless enum that is stored as lower snake-case text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ConversionError { kind: stringify!($name), value: other.to_string() }),
                }
            }
        }

        sql_text!($name);
    };
}

//--------------------------------------   Status streams    ---------------------------------------------------------
text_enum!(
    /// The three event streams that share the `status_events` table.
    StatusStream {
        Payment => "payment",
        Shipping => "shipping",
        Chain => "chain",
    }
);

text_enum!(
    PaymentStatus {
        /// No qualifying deposit has been observed yet.
        Pending => "pending",
        /// A deposit within tolerance of the required amount has been observed. Funds are in escrow.
        Completed => "completed",
        Stuck => "stuck",
        /// A dispute was resolved with a full refund to the buyer.
        Refunded => "refunded",
        /// A dispute was resolved with a partial (or zero) refund.
        Resolved => "resolved",
    }
);

impl PaymentStatus {
    /// Once one of these is recorded, the payment stream accepts no further writes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Resolved)
    }

    /// `refunded` and `resolved` close the whole order, not just the payment stream.
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Refunded | Self::Resolved)
    }
}

text_enum!(ShippingStatus {
    Pending => "pending",
    Shipped => "shipped",
    Completed => "completed",
    Stuck => "stuck",
});

impl ShippingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

text_enum!(ChainStatus {
    Unconfirmed => "unconfirmed",
    Confirmed => "confirmed",
    Failed => "failed",
});

/// A status code together with the stream it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stream", content = "status", rename_all = "snake_case")]
pub enum EventStatus {
    Payment(PaymentStatus),
    Shipping(ShippingStatus),
    Chain(ChainStatus),
}

impl EventStatus {
    pub fn stream(&self) -> StatusStream {
        match self {
            Self::Payment(_) => StatusStream::Payment,
            Self::Shipping(_) => StatusStream::Shipping,
            Self::Chain(_) => StatusStream::Chain,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Payment(s) => s.as_str(),
            Self::Shipping(s) => s.as_str(),
            Self::Chain(s) => s.as_str(),
        }
    }

    pub fn from_parts(stream: StatusStream, code: &str) -> Result<Self, ConversionError> {
        let status = match stream {
            StatusStream::Payment => Self::Payment(code.parse()?),
            StatusStream::Shipping => Self::Shipping(code.parse()?),
            StatusStream::Chain => Self::Chain(code.parse()?),
        };
        Ok(status)
    }
}

impl Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.stream(), self.code())
    }
}

//--------------------------------------  CumulativeStatus   ---------------------------------------------------------
text_enum!(
    /// The single, authoritative status of an order, derived from all of its event streams.
    CumulativeStatus {
        Pending => "pending",
        /// Paid in full and held in escrow, but not yet delivered.
        AwaitingShipment => "awaiting_shipment",
        Completed => "completed",
        Stuck => "stuck",
        Disputed => "disputed",
        Refunded => "refunded",
        Resolved => "resolved",
    }
);

impl CumulativeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Refunded | Self::Resolved)
    }

    pub fn is_settleable(&self) -> bool {
        self.is_terminal()
    }
}

//--------------------------------------     Transaction     ---------------------------------------------------------
/// A single marketplace order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: TransactionId,
    pub package_id: PackageId,
    pub store_id: StoreId,
    pub buyer_id: UserId,
    pub refund_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

//--------------------------------------   EvmTransaction    ---------------------------------------------------------
/// How an order is funded. The escrow address is assigned after creation, so it may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EvmTransaction {
    pub transaction_id: TransactionId,
    pub required_amount: Amount,
    pub currency: String,
    pub chain_id: i64,
    pub escrow_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvmTransaction {
    pub fn escrow_address_pending(&self) -> bool {
        self.escrow_address.is_none()
    }
}

//--------------------------------------       NewOrder      ---------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub package_id: PackageId,
    pub store_id: StoreId,
    pub buyer_id: UserId,
    /// The amount the buyer must deposit into escrow
    pub required_amount: Amount,
    pub currency: String,
    pub chain_id: i64,
    /// Where funds are returned if the order is refunded
    pub refund_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(
        package_id: PackageId,
        store_id: StoreId,
        buyer_id: UserId,
        required_amount: Amount,
        currency: &str,
        chain_id: i64,
    ) -> Self {
        Self {
            package_id,
            store_id,
            buyer_id,
            required_amount,
            currency: currency.to_string(),
            chain_id,
            refund_address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_refund_address<S: Into<String>>(mut self, address: S) -> Self {
        self.refund_address = Some(address.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

//--------------------------------------     StatusEvent     ---------------------------------------------------------
/// One immutable row of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Insertion order. The highest id per stream is that stream's current status.
    pub id: i64,
    pub transaction_id: TransactionId,
    pub status: EventStatus,
    /// The observed deposit amount. Only set on payment events.
    pub amount: Option<Amount>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for StatusEvent {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let stream: StatusStream = row.try_get("stream")?;
        let code: String = row.try_get("status")?;
        let status = EventStatus::from_parts(stream, &code)
            .map_err(|e| sqlx::Error::ColumnDecode { index: "status".into(), source: Box::new(e) })?;
        Ok(Self {
            id: row.try_get("id")?,
            transaction_id: row.try_get("transaction_id")?,
            status,
            amount: row.try_get("amount")?,
            source: row.try_get("source")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl StatusEvent {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        match self.status {
            EventStatus::Payment(s) => Some(s),
            _ => None,
        }
    }

    pub fn shipping_status(&self) -> Option<ShippingStatus> {
        match self.status {
            EventStatus::Shipping(s) => Some(s),
            _ => None,
        }
    }

    pub fn chain_status(&self) -> Option<ChainStatus> {
        match self.status {
            EventStatus::Chain(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStatusEvent {
    pub transaction_id: TransactionId,
    pub status: EventStatus,
    pub amount: Option<Amount>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewStatusEvent {
    pub fn new(transaction_id: TransactionId, status: EventStatus, created_at: DateTime<Utc>) -> Self {
        Self { transaction_id, status, amount: None, source: None, created_at }
    }

    pub fn payment(transaction_id: TransactionId, status: PaymentStatus, created_at: DateTime<Utc>) -> Self {
        Self::new(transaction_id, EventStatus::Payment(status), created_at)
    }

    pub fn shipping(transaction_id: TransactionId, status: ShippingStatus, created_at: DateTime<Utc>) -> Self {
        Self::new(transaction_id, EventStatus::Shipping(status), created_at)
    }

    pub fn chain(transaction_id: TransactionId, status: ChainStatus, created_at: DateTime<Utc>) -> Self {
        Self::new(transaction_id, EventStatus::Chain(status), created_at)
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_source<S: Into<String>>(mut self, source: S) -> Self {
        self.source = Some(source.into());
        self
    }
}

//--------------------------------------      Disputes       ---------------------------------------------------------
text_enum!(DisputeStatus {
    Open => "open",
    UnderReview => "under_review",
    Resolved => "resolved",
});

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }
}

text_enum!(ClaimRole {
    Buyer => "buyer",
    Vendor => "vendor",
    Resolver => "resolver",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Dispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,
    pub status: DisputeStatus,
    pub filed_by: UserId,
    pub reason: String,
    pub resolver_id: Option<UserId>,
    /// The share of the escrowed amount returned to the buyer. Set on resolution.
    pub refund_ratio: Option<Fraction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDispute {
    pub transaction_id: TransactionId,
    pub filed_by: UserId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DisputeClaim {
    pub id: i64,
    pub dispute_id: DisputeId,
    pub author_id: UserId,
    pub role: ClaimRole,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub dispute_id: DisputeId,
    pub author_id: UserId,
    pub role: ClaimRole,
    pub body: String,
}

//--------------------------------------     VendorTier      ---------------------------------------------------------
text_enum!(
    /// The vendor's account tier. Determines the commission rate on completed orders.
    VendorTier {
        Gold => "gold",
        Silver => "silver",
        Bronze => "bronze",
        Free => "free",
    }
);

impl Default for VendorTier {
    fn default() -> Self {
        Self::Free
    }
}

//--------------------------------------     Settlement      ---------------------------------------------------------
text_enum!(SettlementKind {
    /// A delivered order. The platform takes its tier commission.
    Commission => "commission",
    /// A resolved dispute. The buyer gets the refund share and the resolver takes a fee from the vendor's part.
    DisputeSplit => "dispute_split",
});

/// The audited outcome of settling an order, along with the rates in force at the time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    pub kind: SettlementKind,
    pub amount: Amount,
    pub payout: Amount,
    pub commission: Amount,
    pub refund: Amount,
    pub tier: Option<VendorTier>,
    pub commission_rate: Option<Fraction>,
    pub resolver_rate: Option<Fraction>,
    pub refund_ratio: Option<Fraction>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------      Deposits       ---------------------------------------------------------
/// The running total of a store's funds in one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Deposit {
    pub store_id: StoreId,
    pub currency: String,
    pub total: Amount,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DepositHistory {
    pub id: i64,
    pub store_id: StoreId,
    pub currency: String,
    pub amount: Amount,
    pub transaction_id: Option<TransactionId>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDepositEntry {
    pub store_id: StoreId,
    pub currency: String,
    pub amount: Amount,
    pub transaction_id: Option<TransactionId>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Config        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}
