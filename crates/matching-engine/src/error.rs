//! Error taxonomy for the matching kernel
//!
//! Client-visible errors (`ValidationError`, `CancelError`) are typed so
//! callers can map them without string matching. Transient store failures
//! are retried inside the matcher and only surface once the retry budget is
//! exhausted.

use bigdecimal::BigDecimal;
use common::OrderId;
use thiserror::Error;

use crate::store::StoreError;

/// Rejections produced before an order is accepted. Non-retriable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("client_id is required")]
    MissingClientId,

    #[error("instrument is required")]
    MissingInstrument,

    #[error("quantity must be positive (got {0})")]
    NonPositiveQuantity(BigDecimal),

    #[error("price must be positive (got {0})")]
    NonPositivePrice(BigDecimal),

    #[error("limit orders require a price")]
    LimitOrderWithoutPrice,

    #[error("market orders must not carry a price")]
    MarketOrderWithPrice,
}

/// Failures surfaced by [`crate::Exchange::submit`].
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The matcher exhausted its durability-unit retry budget.
    #[error("order {order_id}: durability unit failed after {attempts} attempts")]
    UnitRetriesExhausted { order_id: OrderId, attempts: u32 },

    /// The matcher task terminated without answering the submission.
    #[error("matcher dropped the submission reply")]
    ReplyDropped,
}

/// Typed negative results for cancellation.
#[derive(Error, Debug)]
pub enum CancelError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {0} is already filled")]
    AlreadyFilled(OrderId),

    #[error("order {0} is already cancelled")]
    AlreadyCancelled(OrderId),

    #[error(transparent)]
    Store(#[from] StoreError),
}
