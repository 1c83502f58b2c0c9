//! Error taxonomy shared across the core
//!
//! Each service crate layers its own error enum on top of these; this module
//! holds the kinds that cross crate boundaries.

use crate::ids::{MessageId, OrderId};
use thiserror::Error;

/// Pre-match validation failures
///
/// Caught at the ingress boundary; an order failing validation is REJECTED
/// and never reaches the matching path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("LIMIT orders must specify a price")]
    MissingPrice,

    #[error("MARKET orders must not specify a price")]
    UnexpectedPrice,

    #[error("price must be at least 0.01 with scale <= 8")]
    PriceOutOfRange,

    #[error("quantity must be positive with scale <= 8")]
    NonPositiveQuantity,
}

/// Cancellation failures
///
/// Cancelling a terminal order fails deterministically with the state that
/// blocked it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CancelError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("not authorized to cancel order {0}")]
    NotAuthorized(OrderId),

    #[error("filled orders cannot be cancelled: {0}")]
    AlreadyFilled(OrderId),

    #[error("order already cancelled: {0}")]
    AlreadyCancelled(OrderId),

    #[error("rejected orders cannot be cancelled: {0}")]
    AlreadyRejected(OrderId),
}

/// Duplicate delivery detected by the idempotency layer
///
/// Suppressed at ingress: the record is acknowledged without reprocessing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("duplicate message: {message_id}")]
pub struct DuplicateMessage {
    pub message_id: MessageId,
}
