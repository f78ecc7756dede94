//! Monetary values
//!
//! All ledger arithmetic runs on `rust_decimal::Decimal` and is rounded to
//! two decimal places at the points the source of truth rounds (loan balance,
//! interest, accumulated interest). Payment amounts are validated at
//! construction time so invalid values cannot reach the ledger engine.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum decimal places accepted on a payment amount
const MAX_SCALE: u32 = 2;

/// Round a monetary value to 2 decimal places, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MAX_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// A validated payment amount.
///
/// # Invariants
/// - Value is strictly positive
/// - At most 2 decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

/// Errors raised when constructing an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        if value.normalize().scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(9.534)), dec!(9.53));
        assert_eq!(round_money(dec!(9.535)), dec!(9.54));
        assert_eq!(round_money(dec!(-9.535)), dec!(-9.54));
        assert_eq!(round_money(dec!(100)), dec!(100));
    }

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100.50));
        assert!(amount.is_ok());
        assert_eq!(amount.unwrap().value(), dec!(100.50));
    }

    #[test]
    fn test_amount_zero_rejected() {
        assert!(matches!(
            Amount::new(Decimal::ZERO),
            Err(AmountError::NotPositive(_))
        ));
    }

    #[test]
    fn test_amount_negative_rejected() {
        assert!(matches!(
            Amount::new(dec!(-5)),
            Err(AmountError::NotPositive(_))
        ));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        assert!(matches!(
            Amount::new(dec!(1.005)),
            Err(AmountError::TooManyDecimals(_))
        ));
    }

    #[test]
    fn test_amount_trailing_zeros_ok() {
        // 1.500 normalizes to 1.5
        assert!(Amount::new(dec!(1.500)).is_ok());
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Amount = "123.45".parse().unwrap();
        assert_eq!(amount.value(), dec!(123.45));

        let bad: Result<Amount, _> = "not-a-number".parse();
        assert!(matches!(bad, Err(AmountError::ParseError(_))));
    }
}
