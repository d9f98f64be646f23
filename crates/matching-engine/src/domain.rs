//! Domain types for the matching kernel
//!
//! Price and quantity are `BigDecimal` everywhere; the kernel never touches
//! binary floats on any path that produces durable values. Decimal ordering
//! is numeric, so prices that differ only in scale (100.0 vs 100.00) land
//! on the same price level.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, OrderType, Side, Symbol, TradeId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Numeric minimum of two decimals.
pub(crate) fn min_decimal(a: &BigDecimal, b: &BigDecimal) -> BigDecimal {
    if a <= b {
        a.clone()
    } else {
        b.clone()
    }
}

// ============================================================================
// New Order (submission payload)
// ============================================================================

/// A validated-on-acceptance submission. The external submitter provides
/// this shape; [`NewOrder::into_order`] turns it into an accepted [`Order`]
/// or a typed validation rejection.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub client_id: String,
    pub instrument: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for limit orders, forbidden for market orders
    pub price: Option<BigDecimal>,
    pub quantity: BigDecimal,
    /// Makes retried submissions safe; unique across all orders when present
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    pub fn limit(
        client_id: impl Into<String>,
        instrument: impl Into<Symbol>,
        side: Side,
        price: BigDecimal,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            instrument: instrument.into(),
            side,
            order_type: OrderType::Limit,
            price: Some(price),
            quantity,
            idempotency_key: None,
        }
    }

    pub fn market(
        client_id: impl Into<String>,
        instrument: impl Into<Symbol>,
        side: Side,
        quantity: BigDecimal,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            instrument: instrument.into(),
            side,
            order_type: OrderType::Market,
            price: None,
            quantity,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::MissingClientId);
        }
        if self.instrument.as_str().is_empty() {
            return Err(ValidationError::MissingInstrument);
        }
        if self.quantity <= BigDecimal::zero() {
            return Err(ValidationError::NonPositiveQuantity(self.quantity.clone()));
        }
        match (self.order_type, &self.price) {
            (OrderType::Limit, None) => return Err(ValidationError::LimitOrderWithoutPrice),
            (OrderType::Limit, Some(price)) if *price <= BigDecimal::zero() => {
                return Err(ValidationError::NonPositivePrice(price.clone()));
            }
            (OrderType::Market, Some(_)) => return Err(ValidationError::MarketOrderWithPrice),
            _ => {}
        }
        Ok(())
    }

    /// Promote the submission to an accepted order. Assigns the order id and
    /// the acceptance timestamp; `remaining` starts equal to `quantity`.
    pub fn into_order(self) -> Result<Order, ValidationError> {
        self.validate()?;
        let now = Utc::now();
        Ok(Order {
            id: OrderId::new(),
            client_id: self.client_id,
            instrument: self.instrument,
            side: self.side,
            order_type: self.order_type,
            price: self.price,
            remaining: self.quantity.clone(),
            quantity: self.quantity,
            status: OrderStatus::Open,
            idempotency_key: self.idempotency_key,
            created_at: now,
            updated_at: now,
        })
    }
}

// ============================================================================
// Order
// ============================================================================

/// An accepted order.
///
/// Invariants: `remaining <= quantity` and `remaining` is monotonically
/// non-increasing; `status == Filled` iff `remaining` is zero; a cancelled
/// order is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: String,
    pub instrument: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<BigDecimal>,
    /// Original submitted size, immutable after creation
    pub quantity: BigDecimal,
    pub remaining: BigDecimal,
    pub status: OrderStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Reduce `remaining` by a fill and move the status in lockstep.
    pub fn fill(&mut self, quantity: &BigDecimal) {
        self.remaining = &self.remaining - quantity;
        self.status = if self.remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = Utc::now();
    }

    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    /// Quantity executed so far.
    pub fn filled_quantity(&self) -> BigDecimal {
        &self.quantity - &self.remaining
    }

    /// Whether this order may sit in a book: an active limit order with
    /// quantity left and a price.
    pub fn is_resting_eligible(&self) -> bool {
        self.order_type == OrderType::Limit
            && self.status.is_active()
            && !self.remaining.is_zero()
            && self.price.is_some()
    }
}

// ============================================================================
// Trade
// ============================================================================

/// A matched execution between two orders. Immutable after creation.
///
/// `price` is always the resting order's price at the moment of the match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub instrument: Symbol,
    pub price: BigDecimal,
    pub quantity: BigDecimal,
    pub traded_at: DateTime<Utc>,
}

impl Trade {
    /// Build a trade between an incoming order and a resting counterparty,
    /// mapping the legs onto buy/sell by the incoming side.
    pub fn between(
        instrument: Symbol,
        incoming_id: OrderId,
        incoming_side: Side,
        resting_id: OrderId,
        price: BigDecimal,
        quantity: BigDecimal,
    ) -> Self {
        let (buy_order_id, sell_order_id) = match incoming_side {
            Side::Buy => (incoming_id, resting_id),
            Side::Sell => (resting_id, incoming_id),
        };
        Self {
            id: TradeId::new(),
            buy_order_id,
            sell_order_id,
            instrument,
            price,
            quantity,
            traded_at: Utc::now(),
        }
    }

    /// Whether the given order participated in this trade.
    pub fn involves(&self, order_id: OrderId) -> bool {
        self.buy_order_id == order_id || self.sell_order_id == order_id
    }
}

// ============================================================================
// Aggregated book views
// ============================================================================

/// One aggregated price level of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: BigDecimal,
    pub quantity: BigDecimal,
    pub order_count: usize,
}

/// Depth-limited, consistent view of one instrument's book. Taken while no
/// matcher mutation is in flight for that instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub instrument: Symbol,
    /// Bid levels, best (highest) first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<PriceLevel>,
    pub taken_at: DateTime<Utc>,
}

impl BookSnapshot {
    pub fn empty(instrument: Symbol) -> Self {
        Self {
            instrument,
            bids: Vec::new(),
            asks: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<&BigDecimal> {
        self.bids.first().map(|level| &level.price)
    }

    pub fn best_ask(&self) -> Option<&BigDecimal> {
        self.asks.first().map(|level| &level.price)
    }
}
