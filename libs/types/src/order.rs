//! Order lifecycle types
//!
//! An order enters the book, is reduced by fills during matching, and leaves
//! when filled, cancelled, or pruned at session close.

use crate::ids::OrderId;
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// How long an order remains eligible to rest or match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Rests until filled or explicitly cancelled
    GoodTillCancel,
    /// Matches what it can immediately, remainder is cancelled
    FillAndKill,
    /// Accepted only if the whole quantity matches immediately
    FillOrKill,
    /// Rests until the end of the current trading session
    GoodForDay,
    /// Matches at any price; repriced and converted on admission
    Market,
}

/// A single order
///
/// `remaining_quantity <= initial_quantity` at all times; an order with zero
/// remaining quantity is filled and must not be mutated further. `price` is
/// meaningful only once the order is priced (`Market` orders carry
/// `Price::INVALID` until admission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    order_type: OrderType,
    id: OrderId,
    side: Side,
    price: Price,
    initial_quantity: Quantity,
    remaining_quantity: Quantity,
}

impl Order {
    /// Create a new order
    pub fn new(
        order_type: OrderType,
        id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) -> Self {
        Self {
            order_type,
            id,
            side,
            price,
            initial_quantity: quantity,
            remaining_quantity: quantity,
        }
    }

    /// Create an unpriced market order
    pub fn market(id: OrderId, side: Side, quantity: Quantity) -> Self {
        Self::new(OrderType::Market, id, side, Price::INVALID, quantity)
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn initial_quantity(&self) -> Quantity {
        self.initial_quantity
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.remaining_quantity
    }

    /// Quantity consumed by matching so far
    pub fn filled_quantity(&self) -> Quantity {
        self.initial_quantity - self.remaining_quantity
    }

    /// Check if the order is completely filled
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity.is_zero()
    }

    /// Reduce the remaining quantity by a fill
    ///
    /// # Panics
    /// Panics if the fill exceeds the remaining quantity.
    pub fn fill(&mut self, quantity: Quantity) {
        assert!(
            quantity <= self.remaining_quantity,
            "order {} cannot be filled for more than its remaining quantity",
            self.id
        );

        self.remaining_quantity -= quantity;
    }

    /// Price a market order and convert it to GoodTillCancel
    ///
    /// # Panics
    /// Panics for any non-market order; the transition is one way.
    pub fn to_good_till_cancel(&mut self, price: Price) {
        assert!(
            self.order_type == OrderType::Market,
            "order {} cannot be repriced, only market orders can",
            self.id
        );

        self.price = price;
        self.order_type = OrderType::GoodTillCancel;
    }
}

/// Replacement request for a resting order
///
/// Applying a modification is equivalent to cancelling the existing order and
/// admitting a fresh one with these attributes and the previous type; time
/// priority is always forfeited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModify {
    order_id: OrderId,
    side: Side,
    price: Price,
    quantity: Quantity,
}

impl OrderModify {
    pub fn new(order_id: OrderId, side: Side, price: Price, quantity: Quantity) -> Self {
        Self {
            order_id,
            side,
            price,
            quantity,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn quantity(&self) -> Quantity {
        self.quantity
    }

    /// Build the replacement order, carrying over the original's type
    pub fn to_order(&self, order_type: OrderType) -> Order {
        Order::new(
            order_type,
            self.order_id,
            self.side,
            self.price,
            self.quantity,
        )
    }
}
