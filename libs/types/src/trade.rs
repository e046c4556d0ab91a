//! Trade records produced by matching
//!
//! A trade pairs one bid leg with one ask leg for an agreed quantity. Each
//! leg records the price of its own order, so the two legs of one trade may
//! differ when the incoming order crosses past the resting price.

use crate::ids::OrderId;
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// One leg of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeInfo {
    pub order_id: OrderId,
    pub price: Price,
    pub quantity: Quantity,
}

/// A single match between a bid and an ask
///
/// Both legs carry the same quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub bid: TradeInfo,
    pub ask: TradeInfo,
}

impl Trade {
    pub fn new(bid: TradeInfo, ask: TradeInfo) -> Self {
        Self { bid, ask }
    }

    /// Quantity exchanged, identical on both legs
    pub fn quantity(&self) -> Quantity {
        self.bid.quantity
    }
}
