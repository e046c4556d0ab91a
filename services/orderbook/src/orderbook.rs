//! Order book core
//!
//! Two price-ordered sides, a by-id order map, and an aggregate level index,
//! all guarded by one mutex. Admission drives the matching loop; a background
//! pruner owned by the book cancels day-scoped orders at session close.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use types::errors::RejectReason;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderModify, OrderType, Side};
use types::trade::{Trade, TradeInfo};

use crate::book::{AskBook, BidBook, PriceLevel};
use crate::levels::{LevelIndex, LevelUpdate};
use crate::matching::crossing;
use crate::pruner::{self, SessionClock, SystemClock};

/// Aggregated resting quantity at one price on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub price: Price,
    pub quantity: Quantity,
}

/// Flattened snapshot of both sides
///
/// Bids are sorted descending, asks ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderbookLevelInfos {
    bids: Vec<LevelInfo>,
    asks: Vec<LevelInfo>,
}

impl OrderbookLevelInfos {
    pub fn new(bids: Vec<LevelInfo>, asks: Vec<LevelInfo>) -> Self {
        Self { bids, asks }
    }

    pub fn bids(&self) -> &[LevelInfo] {
        &self.bids
    }

    pub fn asks(&self) -> &[LevelInfo] {
        &self.asks
    }
}

/// Mutable book state, only ever touched with the mutex held
#[derive(Debug, Default)]
struct BookState {
    bids: BidBook,
    asks: AskBook,
    orders: HashMap<OrderId, Order>,
    levels: LevelIndex,
}

impl BookState {
    fn new() -> Self {
        Self::default()
    }

    /// Admit one order and run the matching loop
    fn add_order(&mut self, mut order: Order) -> Vec<Trade> {
        if self.orders.contains_key(&order.id()) {
            debug!(reason = %RejectReason::DuplicateOrderId(order.id()), "order rejected");
            return Vec::new();
        }

        if order.order_type() == OrderType::Market {
            match self.absorbing_price(order.side(), order.remaining_quantity()) {
                Some(price) => order.to_good_till_cancel(price),
                None => {
                    debug!(reason = %RejectReason::InsufficientDepth(order.id()), "order rejected");
                    return Vec::new();
                }
            }
        }

        if order.order_type() == OrderType::FillAndKill
            && !self.can_match(order.side(), order.price())
        {
            debug!(reason = %RejectReason::NoImmediateMatch(order.id()), "order rejected");
            return Vec::new();
        }

        if order.order_type() == OrderType::FillOrKill
            && !self.can_fully_fill(order.side(), order.price(), order.remaining_quantity())
        {
            debug!(reason = %RejectReason::CannotFullyFill(order.id()), "order rejected");
            return Vec::new();
        }

        let id = order.id();
        let price = order.price();
        let quantity = order.initial_quantity();
        match order.side() {
            Side::Buy => self.bids.insert(price, id),
            Side::Sell => self.asks.insert(price, id),
        }
        self.orders.insert(id, order);
        self.levels.apply(price, quantity, LevelUpdate::Add);

        self.match_orders()
    }

    /// Match crossing heads until the spread opens or a side empties
    fn match_orders(&mut self) -> Vec<Trade> {
        let mut trades = Vec::new();

        loop {
            let (Some(bid_price), Some(ask_price)) =
                (self.bids.best_price(), self.asks.best_price())
            else {
                break;
            };
            if !crossing::bid_crosses_ask(bid_price, ask_price) {
                break;
            }
            let (Some(bid_id), Some(ask_id)) = (self.bids.front_order(), self.asks.front_order())
            else {
                break;
            };

            let quantity = self.orders[&bid_id]
                .remaining_quantity()
                .min(self.orders[&ask_id].remaining_quantity());

            let bid_filled = {
                let order = self.orders.get_mut(&bid_id).unwrap();
                order.fill(quantity);
                order.is_filled()
            };
            let ask_filled = {
                let order = self.orders.get_mut(&ask_id).unwrap();
                order.fill(quantity);
                order.is_filled()
            };

            // Each leg records the price of its own order
            trades.push(Trade::new(
                TradeInfo {
                    order_id: bid_id,
                    price: bid_price,
                    quantity,
                },
                TradeInfo {
                    order_id: ask_id,
                    price: ask_price,
                    quantity,
                },
            ));

            if bid_filled {
                self.bids.pop_front(bid_price);
                self.orders.remove(&bid_id);
                self.levels.apply(bid_price, quantity, LevelUpdate::Remove);
            } else {
                self.levels.apply(bid_price, quantity, LevelUpdate::Match);
            }

            if ask_filled {
                self.asks.pop_front(ask_price);
                self.orders.remove(&ask_id);
                self.levels.apply(ask_price, quantity, LevelUpdate::Remove);
            } else {
                self.levels.apply(ask_price, quantity, LevelUpdate::Match);
            }
        }

        // A fill-and-kill order never rests past its own admission
        if let Some(order_id) = self.bids.front_order() {
            if self.orders[&order_id].order_type() == OrderType::FillAndKill {
                self.cancel(order_id);
            }
        }
        if let Some(order_id) = self.asks.front_order() {
            if self.orders[&order_id].order_type() == OrderType::FillAndKill {
                self.cancel(order_id);
            }
        }

        trades
    }

    /// Remove one order; unknown ids are ignored
    fn cancel(&mut self, order_id: OrderId) {
        let Some(order) = self.orders.remove(&order_id) else {
            debug!(reason = %RejectReason::UnknownOrder(order_id), "cancel ignored");
            return;
        };

        let price = order.price();
        match order.side() {
            Side::Buy => self.bids.remove(order_id, price),
            Side::Sell => self.asks.remove(order_id, price),
        };
        self.levels
            .apply(price, order.remaining_quantity(), LevelUpdate::Remove);
    }

    /// Replace a resting order, preserving its type but not its priority
    fn modify(&mut self, modify: OrderModify) -> Vec<Trade> {
        let Some(existing) = self.orders.get(&modify.order_id()) else {
            debug!(reason = %RejectReason::UnknownOrder(modify.order_id()), "modify ignored");
            return Vec::new();
        };
        let order_type = existing.order_type();

        self.cancel(modify.order_id());
        self.add_order(modify.to_order(order_type))
    }

    /// True if an order at `price` would cross the opposite best
    fn can_match(&self, side: Side, price: Price) -> bool {
        let best = match side {
            Side::Buy => self.asks.best_price(),
            Side::Sell => self.bids.best_price(),
        };
        best.is_some_and(|maker_price| crossing::taker_crosses(side, price, maker_price))
    }

    /// True if reachable opposite liquidity covers the whole quantity
    fn can_fully_fill(&self, side: Side, price: Price, quantity: Quantity) -> bool {
        if !self.can_match(side, price) {
            return false;
        }

        let reachable: Vec<Price> = match side {
            Side::Buy => self
                .asks
                .prices()
                .take_while(|maker| crossing::taker_crosses(side, price, *maker))
                .collect(),
            Side::Sell => self
                .bids
                .prices()
                .take_while(|maker| crossing::taker_crosses(side, price, *maker))
                .collect(),
        };

        let mut needed = quantity;
        for level_price in reachable {
            let available = self.levels.quantity_at(level_price);
            if available >= needed {
                return true;
            }
            needed -= available;
        }
        false
    }

    /// Worst opposite price a market order must reach to fill completely
    ///
    /// None when the opposite side cannot absorb the quantity.
    fn absorbing_price(&self, side: Side, quantity: Quantity) -> Option<Price> {
        let opposite: Vec<Price> = match side {
            Side::Buy => self.asks.prices().collect(),
            Side::Sell => self.bids.prices().collect(),
        };

        let mut needed = quantity;
        for level_price in opposite {
            let available = self.levels.quantity_at(level_price);
            if available >= needed {
                return Some(level_price);
            }
            needed -= available;
        }
        None
    }

    fn resting_quantity(&self, level: &PriceLevel) -> Quantity {
        level
            .iter()
            .map(|order_id| self.orders[&order_id].remaining_quantity())
            .fold(Quantity::zero(), |total, quantity| total + quantity)
    }

    fn level_infos(&self) -> OrderbookLevelInfos {
        let bids = self
            .bids
            .iter()
            .map(|(price, level)| LevelInfo {
                price,
                quantity: self.resting_quantity(level),
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .map(|(price, level)| LevelInfo {
                price,
                quantity: self.resting_quantity(level),
            })
            .collect();

        OrderbookLevelInfos::new(bids, asks)
    }

    fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids
            .best_price()
            .map(|price| (price, self.levels.quantity_at(price)))
    }

    fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks
            .best_price()
            .map(|price| (price, self.levels.quantity_at(price)))
    }
}

/// State shared between the operator threads and the pruner
struct Shared {
    state: Mutex<BookState>,
    shutdown_cv: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BookState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Thread-safe limit order book with price-time priority matching
///
/// All public operations acquire the book mutex for their full duration, so
/// they are linearizable with respect to each other and the pruner.
pub struct OrderBook {
    shared: Arc<Shared>,
    prune_thread: Option<JoinHandle<()>>,
}

impl OrderBook {
    /// Create a book pruning against the host's local clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a book with an injected session clock
    pub fn with_clock<C: SessionClock>(clock: C) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(BookState::new()),
            shutdown_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let prune_thread = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || prune_good_for_day_orders(&shared, &clock))
        };

        Self {
            shared,
            prune_thread: Some(prune_thread),
        }
    }

    /// Admit an order, returning the trades it produced
    ///
    /// Duplicate ids and unfillable fill-or-kill, fill-and-kill, and market
    /// orders are rejected with no side effects and an empty trade list.
    pub fn add_order(&self, order: Order) -> Vec<Trade> {
        self.shared.lock_state().add_order(order)
    }

    /// Cancel a resting order; unknown ids are a no-op
    pub fn cancel_order(&self, order_id: OrderId) {
        self.shared.lock_state().cancel(order_id);
    }

    /// Cancel a batch of orders under one lock acquisition
    pub fn cancel_orders(&self, order_ids: &[OrderId]) {
        let mut state = self.shared.lock_state();
        for order_id in order_ids {
            state.cancel(*order_id);
        }
    }

    /// Replace a resting order, forfeiting its time priority
    ///
    /// The replacement keeps the original's type; trades produced by its
    /// re-admission are returned. Unknown ids return an empty list.
    pub fn modify_order(&self, modify: OrderModify) -> Vec<Trade> {
        self.shared.lock_state().modify(modify)
    }

    /// Total count of resting orders
    pub fn size(&self) -> usize {
        self.shared.lock_state().orders.len()
    }

    /// Best bid price with its level quantity
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.shared.lock_state().best_bid()
    }

    /// Best ask price with its level quantity
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.shared.lock_state().best_ask()
    }

    /// Consistent snapshot of both sides for market-data consumers
    pub fn get_order_infos(&self) -> OrderbookLevelInfos {
        self.shared.lock_state().level_infos()
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OrderBook {
    fn drop(&mut self) {
        {
            // The lock orders the flag store against the pruner's wait
            let _state = self.shared.lock_state();
            self.shared.shutdown.store(true, Ordering::Release);
            self.shared.shutdown_cv.notify_all();
        }

        if let Some(handle) = self.prune_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Pruner thread body: sweep day orders at each session close
fn prune_good_for_day_orders<C: SessionClock>(shared: &Shared, clock: &C) {
    debug!("day-order pruner started");

    loop {
        let wait = pruner::until_next_prune(clock.now());

        {
            let state = shared.lock_state();
            if shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            let (_state, timeout) = shared
                .shutdown_cv
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner);
            if !timeout.timed_out() {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                // Spurious wakeup, recompute the deadline
                continue;
            }
        }

        // Collect ids first, then cancel; the book is not mutated mid-walk
        let expired: Vec<OrderId> = {
            let state = shared.lock_state();
            state
                .orders
                .values()
                .filter(|order| order.order_type() == OrderType::GoodForDay)
                .map(|order| order.id())
                .collect()
        };

        if expired.is_empty() {
            continue;
        }

        info!(count = expired.len(), "session close, cancelling day orders");
        let mut state = shared.lock_state();
        for order_id in &expired {
            state.cancel(*order_id);
        }
    }

    debug!("day-order pruner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(order_type: OrderType, id: u64, side: Side, price: i32, qty: u32) -> Order {
        Order::new(
            order_type,
            OrderId::new(id),
            side,
            Price::new(price),
            Quantity::new(qty),
        )
    }

    fn gtc(id: u64, side: Side, price: i32, qty: u32) -> Order {
        limit(OrderType::GoodTillCancel, id, side, price, qty)
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let book = OrderBook::new();
        assert!(book.add_order(gtc(1, Side::Buy, 100, 10)).is_empty());

        let trades = book.add_order(gtc(1, Side::Buy, 101, 5));
        assert!(trades.is_empty());
        assert_eq!(book.size(), 1);
        assert_eq!(book.best_bid(), Some((Price::new(100), Quantity::new(10))));
    }

    #[test]
    fn test_cancel_unknown_is_noop() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 10));

        book.cancel_order(OrderId::new(99));
        assert_eq!(book.size(), 1);
    }

    #[test]
    fn test_cancel_removes_level() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 10));
        book.add_order(gtc(2, Side::Buy, 100, 5));

        book.cancel_order(OrderId::new(1));
        assert_eq!(book.best_bid(), Some((Price::new(100), Quantity::new(5))));

        book.cancel_order(OrderId::new(2));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn test_fill_and_kill_residual_cancelled() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 5));

        let trades = book.add_order(limit(OrderType::FillAndKill, 2, Side::Sell, 100, 10));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity(), Quantity::new(5));
        assert_eq!(book.size(), 0);
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_fill_and_kill_no_cross_rejected() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 5));

        let trades = book.add_order(limit(OrderType::FillAndKill, 2, Side::Sell, 101, 10));

        assert!(trades.is_empty());
        assert_eq!(book.size(), 1);
    }

    #[test]
    fn test_market_order_walks_reachable_depth() {
        let book = OrderBook::new();
        book.add_order(gtc(10, Side::Sell, 100, 5));
        book.add_order(gtc(11, Side::Sell, 101, 5));

        let trades = book.add_order(Order::market(OrderId::new(20), Side::Buy, Quantity::new(8)));

        assert_eq!(trades.len(), 2);
        // Repriced to the boundary level before matching
        assert_eq!(trades[0].bid.price, Price::new(101));
        assert_eq!(trades[0].ask.price, Price::new(100));
        assert_eq!(trades[1].bid.price, Price::new(101));
        assert_eq!(trades[1].ask.price, Price::new(101));
        assert_eq!(book.size(), 1);
        assert_eq!(book.best_ask(), Some((Price::new(101), Quantity::new(2))));
    }

    #[test]
    fn test_market_order_insufficient_depth_rejected() {
        let book = OrderBook::new();
        book.add_order(gtc(10, Side::Sell, 100, 5));

        let trades = book.add_order(Order::market(OrderId::new(20), Side::Buy, Quantity::new(8)));

        assert!(trades.is_empty());
        assert_eq!(book.size(), 1);
        assert_eq!(book.best_ask(), Some((Price::new(100), Quantity::new(5))));
    }

    #[test]
    fn test_market_order_empty_book_rejected() {
        let book = OrderBook::new();
        let trades = book.add_order(Order::market(OrderId::new(1), Side::Sell, Quantity::new(1)));

        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn test_modify_unknown_ignored() {
        let book = OrderBook::new();
        let trades = book.modify_order(OrderModify::new(
            OrderId::new(1),
            Side::Buy,
            Price::new(100),
            Quantity::new(5),
        ));

        assert!(trades.is_empty());
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn test_modify_forfeits_time_priority() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 100, 5));
        book.add_order(gtc(2, Side::Buy, 100, 5));

        // Requeued behind order 2 even though nothing else changed
        book.modify_order(OrderModify::new(
            OrderId::new(1),
            Side::Buy,
            Price::new(100),
            Quantity::new(5),
        ));

        let trades = book.add_order(gtc(3, Side::Sell, 100, 5));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.order_id, OrderId::new(2));
    }

    #[test]
    fn test_modify_can_cross() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 99, 5));
        book.add_order(gtc(2, Side::Sell, 101, 5));

        let trades = book.modify_order(OrderModify::new(
            OrderId::new(1),
            Side::Buy,
            Price::new(101),
            Quantity::new(5),
        ));

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].bid.order_id, OrderId::new(1));
        assert_eq!(trades[0].bid.price, Price::new(101));
        assert_eq!(trades[0].ask.price, Price::new(101));
        assert_eq!(book.size(), 0);
    }

    #[test]
    fn test_snapshot_sorted_and_aggregated() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Buy, 99, 5));
        book.add_order(gtc(2, Side::Buy, 100, 3));
        book.add_order(gtc(3, Side::Buy, 100, 2));
        book.add_order(gtc(4, Side::Sell, 102, 4));
        book.add_order(gtc(5, Side::Sell, 101, 1));

        let infos = book.get_order_infos();

        assert_eq!(
            infos.bids(),
            &[
                LevelInfo {
                    price: Price::new(100),
                    quantity: Quantity::new(5)
                },
                LevelInfo {
                    price: Price::new(99),
                    quantity: Quantity::new(5)
                },
            ]
        );
        assert_eq!(
            infos.asks(),
            &[
                LevelInfo {
                    price: Price::new(101),
                    quantity: Quantity::new(1)
                },
                LevelInfo {
                    price: Price::new(102),
                    quantity: Quantity::new(4)
                },
            ]
        );
    }

    #[test]
    fn test_trades_follow_price_time_priority() {
        let book = OrderBook::new();
        book.add_order(gtc(1, Side::Sell, 101, 5));
        book.add_order(gtc(2, Side::Sell, 100, 5));
        book.add_order(gtc(3, Side::Sell, 100, 5));

        let trades = book.add_order(gtc(4, Side::Buy, 101, 12));

        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].ask.order_id, OrderId::new(2));
        assert_eq!(trades[1].ask.order_id, OrderId::new(3));
        assert_eq!(trades[2].ask.order_id, OrderId::new(1));
        assert_eq!(trades[2].quantity(), Quantity::new(2));
    }
}
