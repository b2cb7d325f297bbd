//! Validated fixed-point currency amounts.
//!
//! Transaction amounts are always stored with exactly two fractional digits
//! and bounded by configured min/max (§6.3, §6.5 of the orchestrator spec).

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// A payment amount rounded to 2 fractional digits, always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

#[derive(Debug, thiserror::Error)]
pub enum AmountParseError {
    #[error("invalid amount format")]
    InvalidFormat,
    #[error("amount must be positive")]
    NotPositive,
    #[error("amount has more than 2 fractional digits")]
    TooMuchPrecision,
}

impl Amount {
    /// Constructs an `Amount`, rounding to 2 fractional digits (banker's rounding is
    /// avoided on purpose: payment amounts round half-up).
    pub fn new(value: Decimal) -> Result<Self, AmountParseError> {
        if value <= Decimal::ZERO {
            return Err(AmountParseError::NotPositive);
        }
        if value.scale() > 2 {
            return Err(AmountParseError::TooMuchPrecision);
        }
        Ok(Amount(value.round_dp(2)))
    }

    pub fn parse(input: &str) -> Result<Self, AmountParseError> {
        let decimal = Decimal::from_str(input.trim()).map_err(|_| AmountParseError::InvalidFormat)?;
        Self::new(decimal)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_between(&self, min: Amount, max: Amount) -> bool {
        self.0 >= min.0 && self.0 <= max.0
    }
}

impl TryFrom<f64> for Amount {
    type Error = AmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(AmountParseError::InvalidFormat)?;
        Self::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_decimal_amount() {
        let amount = Amount::parse("100.00").unwrap();
        assert_eq!(amount.to_string(), "100.00");
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(Amount::parse("0.00").is_err());
        assert!(Amount::parse("-5.00").is_err());
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(Amount::parse("10.001").is_err());
    }

    #[test]
    fn boundary_min_accepted_and_below_rejected() {
        let min = Amount::parse("1.00").unwrap();
        let at_min = Amount::parse("1.00").unwrap();
        let below_min = Amount::parse("0.99").unwrap();
        assert!(at_min.is_between(min, Amount::parse("999999.00").unwrap()));
        assert!(!below_min.is_between(min, Amount::parse("999999.00").unwrap()));
    }
}
