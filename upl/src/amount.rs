//! Exact decimal amounts.
//!
//! Payment amounts travel as decimal strings (`"0.01"`) and are converted to
//! integer base units (lamports, token atoms) using the asset's decimal
//! exponent. Binary floats are never involved in that conversion.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static DECIMAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid decimal pattern"));

/// Largest exponent whose power of ten fits a `u64`.
const MAX_DECIMALS: u8 = 19;

/// Error raised when an amount cannot be parsed or scaled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a plain non-negative decimal number.
    #[error("invalid amount format: {0:?}")]
    InvalidFormat(String),
    /// The amount has more fractional digits than the asset supports.
    #[error("amount {amount} has more than {decimals} fractional digits")]
    WrongPrecision {
        /// Offending amount.
        amount: Decimal,
        /// Asset decimal exponent.
        decimals: u8,
    },
    /// The scaled amount does not fit into a 64-bit base-unit quantity.
    #[error("amount {amount} overflows base units at {decimals} decimals")]
    Overflow {
        /// Offending amount.
        amount: Decimal,
        /// Asset decimal exponent.
        decimals: u8,
    },
}

/// A non-negative exact decimal amount of some asset.
///
/// Serialized as a decimal string so that JSON consumers never see a float.
/// Deserialization also accepts JSON numbers, since some servers emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wraps a decimal, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::InvalidFormat`] for negative input.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::InvalidFormat(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Parses a plain decimal string such as `"0.01"` or `"12"`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::InvalidFormat`] on signs, exponents, currency
    /// symbols, or anything else that is not a bare decimal.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        if !DECIMAL_PATTERN.is_match(trimmed) {
            return Err(AmountError::InvalidFormat(input.to_owned()));
        }
        Decimal::from_str(trimmed)
            .map(Self)
            .map_err(|_| AmountError::InvalidFormat(input.to_owned()))
    }

    /// Builds an amount from an integer count of base units.
    ///
    /// `from_base_units(500_000_000, 9)` is `0.5`. Exponents above 28 are
    /// clamped to the largest scale a [`Decimal`] supports.
    #[must_use]
    pub fn from_base_units(units: u64, decimals: u8) -> Self {
        let scale = u32::from(decimals.min(28));
        Self(Decimal::from_i128_with_scale(i128::from(units), scale).normalize())
    }

    /// Scales the amount to integer base units.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::WrongPrecision`] if the amount cannot be
    /// represented exactly at `decimals`, or [`AmountError::Overflow`] if the
    /// result exceeds `u64`.
    pub fn to_base_units(&self, decimals: u8) -> Result<u64, AmountError> {
        let overflow = || AmountError::Overflow {
            amount: self.0,
            decimals,
        };
        if decimals > MAX_DECIMALS {
            return Err(overflow());
        }
        let factor = 10u64.pow(u32::from(decimals));
        let scaled = self
            .0
            .checked_mul(Decimal::from(factor))
            .ok_or_else(overflow)?;
        if !scaled.fract().is_zero() {
            return Err(AmountError::WrongPrecision {
                amount: self.0,
                decimals,
            });
        }
        scaled.to_u64().ok_or_else(overflow)
    }

    /// Returns the inner decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Returns `true` for the zero amount.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative decimal string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Amount::parse(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Amount(Decimal::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Amount::new(Decimal::from(v)).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                let decimal = Decimal::from_f64(v)
                    .ok_or_else(|| E::custom(format!("amount {v} is not representable")))?;
                Amount::new(decimal).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_half_sol_scales_to_lamports() {
        let amount = Amount::parse("0.5").unwrap();
        assert_eq!(amount.to_base_units(9).unwrap(), 500_000_000);
        assert_eq!(Amount::from_base_units(500_000_000, 9), amount);
        assert_eq!(Amount::from_base_units(500_000_000, 9).to_string(), "0.5");
    }

    #[test]
    fn test_token_amount_at_six_decimals() {
        let amount = Amount::parse("1.25").unwrap();
        assert_eq!(amount.to_base_units(6).unwrap(), 1_250_000);
        assert_eq!(Amount::from_base_units(1_250_000, 6).to_string(), "1.25");
    }

    #[test]
    fn test_excess_precision_is_rejected() {
        let amount = Amount::parse("0.0000001").unwrap();
        assert!(matches!(
            amount.to_base_units(6),
            Err(AmountError::WrongPrecision { decimals: 6, .. })
        ));
    }

    #[test]
    fn test_overflow_is_rejected() {
        let amount = Amount::parse("100000000000").unwrap();
        assert!(matches!(
            amount.to_base_units(9),
            Err(AmountError::Overflow { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_non_decimal_input() {
        for input in ["-1", "1e5", "$0.01", "", "abc", "1.", ".5"] {
            assert!(Amount::parse(input).is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_serde_string_and_number() {
        let from_str: Amount = serde_json::from_str("\"0.01\"").unwrap();
        let from_num: Amount = serde_json::from_str("2").unwrap();
        assert_eq!(from_str.to_string(), "0.01");
        assert_eq!(from_num.to_string(), "2");
        assert_eq!(serde_json::to_string(&from_str).unwrap(), "\"0.01\"");
        assert!(serde_json::from_str::<Amount>("-3").is_err());
    }
}
