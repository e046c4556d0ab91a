//! Rejection taxonomy
//!
//! Rejections are expected outcomes in a busy book: the affected operation
//! returns no trades and leaves the book untouched. The reason is surfaced
//! through logging rather than an error return.

use crate::ids::OrderId;
use thiserror::Error;

/// Why an order operation was rejected or ignored
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    #[error("order {0} duplicates a resting order id")]
    DuplicateOrderId(OrderId),

    #[error("fill-and-kill order {0} cannot match at its price")]
    NoImmediateMatch(OrderId),

    #[error("fill-or-kill order {0} cannot be fully filled")]
    CannotFullyFill(OrderId),

    #[error("market order {0} exceeds available opposite liquidity")]
    InsufficientDepth(OrderId),

    #[error("order {0} is not in the book")]
    UnknownOrder(OrderId),
}
