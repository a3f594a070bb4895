//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one. Two quantities of 5 are the same quantity; two products with
/// the same name are still different products (entities).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A strictly positive stock quantity.
///
/// Increase/decrease entry points take a `Quantity`; the direction is carried by
/// the action, never by the sign of the input.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::invalid_quantity(format!(
                "quantity must be a positive integer, got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Parse a quantity coming from a loosely typed source (query strings, CSV imports).
    ///
    /// Only base-10 integers are accepted; `"2.5"`, `"abc"` and `"0"` are rejected.
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| DomainError::invalid_quantity(format!("'{trimmed}' is not an integer")))?;
        Self::new(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl ValueObject for Quantity {}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_negative() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(-3).is_err());
        assert_eq!(Quantity::new(7).unwrap().get(), 7);
    }

    #[test]
    fn parse_rejects_non_integers() {
        assert!(matches!(Quantity::parse("2.5"), Err(DomainError::InvalidQuantity(_))));
        assert!(matches!(Quantity::parse("ten"), Err(DomainError::InvalidQuantity(_))));
        assert_eq!(Quantity::parse(" 12 ").unwrap().get(), 12);
    }

    #[test]
    fn deserialize_validates() {
        let ok: Quantity = serde_json::from_str("4").unwrap();
        assert_eq!(ok.get(), 4);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
    }
}
