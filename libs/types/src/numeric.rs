//! Integer tick and lot types for prices and quantities
//!
//! Prices are signed tick counts and quantities are unsigned lot counts,
//! keeping book arithmetic deterministic across platforms.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Price in signed integer ticks
///
/// `Price::INVALID` is the sentinel carried by market orders until they are
/// repriced on admission; it never denotes a tradable level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i32);

impl Price {
    /// Sentinel for orders that have not been priced yet.
    pub const INVALID: Price = Price(i32::MAX);

    /// Create a price from a tick count
    pub fn new(ticks: i32) -> Self {
        Self(ticks)
    }

    /// Get the tick count
    pub fn ticks(&self) -> i32 {
        self.0
    }

    /// False only for the unpriced sentinel
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity in unsigned integer lots
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Create a quantity from a lot count
    pub fn new(lots: u32) -> Self {
        Self(lots)
    }

    /// Zero quantity
    pub fn zero() -> Self {
        Self(0)
    }

    /// Get the lot count
    pub fn lots(&self) -> u32 {
        self.0
    }

    /// Check if the quantity is zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Smaller of two quantities
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(
            self.0 >= rhs.0,
            "Quantity subtraction would result in negative"
        );
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
