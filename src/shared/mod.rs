//! Shared newtypes and utilities used across all domain modules.
//!
//! These types are serialization-transparent: they serialize/deserialize
//! identically to the string form the console backend sends.

pub mod serde_util;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

// ─── Amount ──────────────────────────────────────────────────────────────────

/// A monetary amount kept in its textual decimal form (e.g. `"10.00"`).
///
/// The backend sends amounts either as JSON numbers or as numeric strings.
/// String inputs keep their wire precision (`"10.00"` stays `"10.00"`).
/// JSON numbers carry no precision of their own, so they are normalized
/// through [`Decimal::normalize`]: `10.0` and `10` both become `"10"`, and
/// compare equal to the string `"10"`. Use [`Amount::to_decimal`] to compare
/// values regardless of precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount(String);

impl Amount {
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    /// Parse a numeric-looking string. Returns `None` for empty or non-numeric text.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .ok()
            .map(|_| Self(trimmed.to_string()))
    }

    /// Normalize a JSON value (number or numeric string).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(&n.to_string())),
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    fn from_number(text: &str) -> Self {
        match Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)) {
            Ok(decimal) => Self(decimal.normalize().to_string()),
            Err(_) => Self(text.to_string()),
        }
    }

    /// Like [`Amount::from_value`], but a zero amount counts as absent.
    ///
    /// Used for bonus fields, where `0`, `"0.00"` and `""` all mean "no bonus".
    pub fn nonzero_from_value(value: &Value) -> Option<Self> {
        Self::from_value(value).filter(|amount| !amount.is_zero())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decimal view of the amount. Unparseable exponents fall back to zero.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_str(&self.0)
            .or_else(|_| Decimal::from_scientific(&self.0))
            .unwrap_or_default()
    }

    pub fn is_zero(&self) -> bool {
        self.to_decimal().is_zero()
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s).ok_or_else(|| format!("Invalid amount: '{}'", s))
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Amount::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("Invalid amount: {}", value)))
    }
}
