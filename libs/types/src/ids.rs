//! Identifier types for book entities
//!
//! Order ids are assigned by the submitting client and must stay unique for
//! the lifetime of the process; the book never mints ids of its own.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Create an OrderId from a raw value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_roundtrip() {
        let id = OrderId::new(42);
        assert_eq!(id.value(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");

        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
