use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sql_text;

/// A decimal in the closed range `[0, 1]`: refund ratios, commission rates and the resolver's cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Fraction(Decimal);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FractionError {
    #[error("{0} is outside the range [0, 1]")]
    OutOfRange(Decimal),
    #[error("'{0}' is not a decimal number")]
    NotANumber(String),
}

sql_text!(Fraction);

impl Fraction {
    pub const ZERO: Fraction = Fraction(Decimal::ZERO);
    pub const ONE: Fraction = Fraction(Decimal::ONE);

    pub fn new(value: Decimal) -> Result<Self, FractionError> {
        if value < Decimal::ZERO || value > Decimal::ONE {
            return Err(FractionError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_one(&self) -> bool {
        self.0 == Decimal::ONE
    }
}

impl TryFrom<Decimal> for Fraction {
    type Error = FractionError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Fraction> for Decimal {
    fn from(value: Fraction) -> Self {
        value.0
    }
}

impl FromStr for Fraction {
    type Err = FractionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| FractionError::NotANumber(s.to_string()))?;
        Self::new(value)
    }
}

impl Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}
