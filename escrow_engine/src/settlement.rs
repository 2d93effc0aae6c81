//! # Settlement arithmetic
//!
//! Pure functions that split an escrowed amount between vendor, platform, buyer and resolver. All arithmetic is exact
//! decimal arithmetic; nothing is rounded.
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Amount, CumulativeStatus, Fraction, SettlementKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("{0}")]
    OutOfDomain(String),
    #[error("{0}")]
    InvalidTransition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementAmounts {
    /// The escrowed amount being distributed
    pub amount: Amount,
    /// What the vendor receives
    pub payout: Amount,
    /// What the platform (or, for disputes, the resolver) keeps
    pub commission: Amount,
    /// What goes back to the buyer
    pub refund: Amount,
}

fn fraction(name: &str, value: Decimal) -> Result<Fraction, SettlementError> {
    Fraction::new(value).map_err(|e| SettlementError::OutOfDomain(format!("{name}: {e}")))
}

fn overflow(what: &str, amount: Amount) -> SettlementError {
    SettlementError::OutOfDomain(format!("The {what} for an escrowed amount of {amount} cannot be represented"))
}

fn check_amount(amount: Amount) -> Result<(), SettlementError> {
    if amount < Amount::ZERO {
        return Err(SettlementError::OutOfDomain(format!("Escrowed amount {amount} is negative")));
    }
    Ok(())
}

/// Which kind of settlement applies to an order in the given cumulative status.
pub fn settlement_kind_for(status: CumulativeStatus) -> Result<SettlementKind, SettlementError> {
    match status {
        CumulativeStatus::Completed => Ok(SettlementKind::Commission),
        CumulativeStatus::Resolved | CumulativeStatus::Refunded => Ok(SettlementKind::DisputeSplit),
        other => Err(SettlementError::InvalidTransition(format!("An order that is {other} cannot be settled"))),
    }
}

/// `commission = amount * rate`, `payout = amount - commission`.
pub fn commission_split(amount: Amount, rate: Decimal) -> Result<SettlementAmounts, SettlementError> {
    check_amount(amount)?;
    let rate = fraction("commission rate", rate)?;
    let commission = amount.checked_mul(rate.value()).ok_or_else(|| overflow("commission", amount))?;
    let payout = amount.checked_sub(commission).ok_or_else(|| overflow("payout", amount))?;
    Ok(SettlementAmounts { amount, payout, commission, refund: Amount::ZERO })
}

/// The buyer receives `amount * ratio`. The resolver takes `resolver_rate` of what is left, and the vendor gets the
/// rest.
pub fn dispute_split(
    amount: Amount,
    refund_ratio: Decimal,
    resolver_rate: Decimal,
) -> Result<SettlementAmounts, SettlementError> {
    check_amount(amount)?;
    let ratio = fraction("refund ratio", refund_ratio)?;
    let resolver_rate = fraction("resolver percent", resolver_rate)?;
    let refund = amount.checked_mul(ratio.value()).ok_or_else(|| overflow("refund", amount))?;
    let vendor_gross = amount.checked_sub(refund).ok_or_else(|| overflow("vendor share", amount))?;
    let resolver_fee =
        vendor_gross.checked_mul(resolver_rate.value()).ok_or_else(|| overflow("resolver fee", amount))?;
    let payout = vendor_gross.checked_sub(resolver_fee).ok_or_else(|| overflow("payout", amount))?;
    Ok(SettlementAmounts { amount, payout, commission: resolver_fee, refund })
}
