mod amount;
mod fraction;
mod helpers;
mod ids;

pub mod op;
pub mod sql_text;

pub use amount::{Amount, AmountConversionError};
pub use fraction::{Fraction, FractionError};
pub use helpers::{format_duration, parse_boolean_flag, parse_duration, DurationParseError};
pub use ids::{DisputeId, PackageId, StoreId, TransactionId, UserId};
