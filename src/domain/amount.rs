//! Monetary value object.
//!
//! Backed by an `i64` count of minor currency units (cents) rather than a
//! float so that "exact equality" (spec §3, §8) is a plain integer compare
//! with no epsilon. The prize pool's core invariant revalidates this
//! equality after every mutation, so floating point drift is not an option.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    GBP,
}

impl Currency {
    pub fn is_valid_code(code: &str) -> bool {
        matches!(code, "USD" | "EUR" | "GBP")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        };
        write!(f, "{code}")
    }
}

/// A non-negative monetary quantity, stored as minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Amount {
    minor_units: i64,
}

impl Amount {
    pub const ZERO: Amount = Amount { minor_units: 0 };

    /// Constructs an `Amount` from a whole count of minor units (cents).
    /// Fails if negative.
    pub fn from_minor_units(minor_units: i64) -> CoreResult<Self> {
        if minor_units < 0 {
            return Err(CoreError::ValidationError(
                "amount cannot be negative".into(),
            ));
        }
        Ok(Amount { minor_units })
    }

    /// Constructs an `Amount` from a major-unit float (e.g. dollars), rounding
    /// to the nearest cent. Intended for call sites translating tier entry
    /// fees (`1.00`, `2.00`, `5.00`) into the internal representation.
    pub fn from_major_units_f64(value: f64) -> CoreResult<Self> {
        if value < 0.0 {
            return Err(CoreError::ValidationError(
                "amount cannot be negative".into(),
            ));
        }
        Amount::from_minor_units((value * 100.0).round() as i64)
    }

    pub fn minor_units(&self) -> i64 {
        self.minor_units
    }

    pub fn to_float(&self) -> f64 {
        self.minor_units as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    /// Adds two amounts. Fails on overflow rather than wrapping.
    pub fn add(&self, other: Amount) -> CoreResult<Amount> {
        self.minor_units
            .checked_add(other.minor_units)
            .map(|minor_units| Amount { minor_units })
            .ok_or_else(|| CoreError::Internal("amount overflow on add".into()))
    }

    /// Subtracts, failing (rather than going negative) if `other` exceeds `self`.
    pub fn subtract(&self, other: Amount) -> CoreResult<Amount> {
        if other.minor_units > self.minor_units {
            return Err(CoreError::ValidationError(
                "subtraction would make amount negative".into(),
            ));
        }
        Ok(Amount {
            minor_units: self.minor_units - other.minor_units,
        })
    }

    fn to_decimal_string(self) -> String {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let abs = self.minor_units.abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    fn parse_decimal_string(s: &str) -> CoreResult<Self> {
        let invalid = || CoreError::ValidationError(format!("invalid decimal amount: {s}"));
        let mut parts = s.splitn(2, '.');
        let whole: i64 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let frac_str = parts.next().unwrap_or("0");
        if frac_str.len() > 2 {
            return Err(invalid());
        }
        let frac: i64 = format!("{frac_str:0<2}").parse().map_err(|_| invalid())?;
        let minor_units = whole
            .checked_mul(100)
            .and_then(|w| {
                if whole < 0 {
                    w.checked_sub(frac)
                } else {
                    w.checked_add(frac)
                }
            })
            .ok_or_else(invalid)?;
        Amount::from_minor_units(minor_units)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_decimal_string()
    }
}

impl TryFrom<String> for Amount {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::parse_decimal_string(&value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_construction() {
        assert!(Amount::from_minor_units(-1).is_err());
    }

    #[test]
    fn add_is_exact() {
        let a = Amount::from_major_units_f64(0.50).unwrap();
        let b = Amount::from_major_units_f64(1.00).unwrap();
        let c = Amount::from_major_units_f64(1.00).unwrap();
        let total = a.add(b).unwrap().add(c).unwrap();
        assert_eq!(total, Amount::from_major_units_f64(2.50).unwrap());
        assert_eq!(total.to_float(), 2.50);
    }

    #[test]
    fn overflow_on_add_is_an_error() {
        let max = Amount::from_minor_units(i64::MAX).unwrap();
        let one = Amount::from_minor_units(1).unwrap();
        assert!(max.add(one).is_err());
    }

    #[test]
    fn decimal_round_trip() {
        let amount = Amount::from_major_units_f64(42.05).unwrap();
        let encoded: String = amount.into();
        assert_eq!(encoded, "42.05");
        let decoded = Amount::try_from(encoded).unwrap();
        assert_eq!(decoded, Amount::from_major_units_f64(42.05).unwrap());
    }

    #[test]
    fn is_zero_positive_negative() {
        assert!(Amount::ZERO.is_zero());
        assert!(!Amount::ZERO.is_positive());
        assert!(!Amount::ZERO.is_negative());
        let one = Amount::from_minor_units(1).unwrap();
        assert!(one.is_positive());
    }

    #[test]
    fn subtract_below_zero_is_an_error() {
        let one = Amount::from_minor_units(1).unwrap();
        let two = Amount::from_minor_units(2).unwrap();
        assert!(one.subtract(two).is_err());
    }
}
