//! Crossing detection logic
//!
//! Determines when a bid and an ask can trade based on price compatibility.

use types::numeric::Price;
use types::order::Side;

/// Check if a bid and an ask cross
///
/// A buy matches a sell when the bid price is at or above the ask price.
pub fn bid_crosses_ask(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if a taker at `taker_price` reaches a maker at `maker_price`
pub fn taker_crosses(taker_side: Side, taker_price: Price, maker_price: Price) -> bool {
    match taker_side {
        Side::Buy => taker_price >= maker_price,
        Side::Sell => taker_price <= maker_price,
    }
}
