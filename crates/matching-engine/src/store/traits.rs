//! Durable store contract
//!
//! The store is the authority for on-disk order and trade state. The
//! matcher commits every fill through [`OrderStore::execute_trade_unit`]
//! and only mutates its in-memory book after a unit commits; cancellation
//! and matching compete for the same row-level exclusion, with the durable
//! store as the arbiter.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use common::{OrderId, Symbol};
use thiserror::Error;

use crate::domain::{Order, Trade};
use crate::error::CancelError;

/// Infrastructure failures of the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Outcome of persisting an acceptance.
#[derive(Debug)]
pub enum Accepted {
    /// The order row was inserted.
    New(Order),
    /// An order with the same idempotency key already exists; this is the
    /// previously accepted row (idempotent replay, not an error).
    Replayed(Order),
}

/// One trade plus both legs' post-trade remainings, committed atomically.
#[derive(Debug)]
pub struct TradeUnit<'a> {
    pub trade: &'a Trade,
    pub incoming_id: OrderId,
    pub resting_id: OrderId,
    pub new_incoming_remaining: &'a BigDecimal,
    pub new_resting_remaining: &'a BigDecimal,
}

/// Durable state observed when a trade unit could not be applied as
/// requested. The matcher recomputes its quantity from these values.
#[derive(Debug, Clone)]
pub struct UnitSkew {
    pub incoming_remaining: BigDecimal,
    pub incoming_active: bool,
    pub resting_remaining: BigDecimal,
    pub resting_active: bool,
}

/// Failure modes of a durability unit.
#[derive(Error, Debug)]
pub enum TradeUnitError {
    /// The durable rows no longer support the requested quantities (a
    /// concurrent cancel won, or the expected deltas do not line up). The
    /// transaction was rolled back; nothing changed.
    #[error("serialization skew on trade unit")]
    Skew(UnitSkew),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transactional persistence used by the matcher and the order lifecycle.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the accepted order row. A duplicate idempotency key resolves
    /// to exactly one inserted row; the loser reads the winner's row.
    async fn accept(&self, order: Order) -> Result<Accepted, StoreError>;

    /// Within one transaction: lock both legs, verify the expected deltas
    /// against the durable remainings, insert the trade row and update both
    /// legs' remaining/status. Any failure rolls back completely.
    async fn execute_trade_unit(&self, unit: TradeUnit<'_>) -> Result<(), TradeUnitError>;

    /// Lock the row; refuse if filled or already cancelled; otherwise mark
    /// cancelled. Returns the post-cancel order snapshot.
    async fn cancel(&self, order_id: OrderId) -> Result<Order, CancelError>;

    /// Reconcile the incoming order at the end of a matching pass: the
    /// authoritative remaining is the minimum of the durable value and the
    /// matcher's computed value, with status following. Returns the final
    /// row.
    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        computed_remaining: &BigDecimal,
    ) -> Result<Order, StoreError>;

    /// All limit orders still eligible to rest, in creation order. Used by
    /// boot-time recovery.
    async fn load_open(&self) -> Result<Vec<Order>, StoreError>;

    /// Read one order row.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All trades involving the given order, oldest first.
    async fn trades_for_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError>;

    /// Recent trades on an instrument, newest first.
    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> Result<Vec<Trade>, StoreError>;
}
