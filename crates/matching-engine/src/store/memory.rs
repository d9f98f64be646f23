//! In-memory store backend
//!
//! Implements the same observable semantics as the Postgres backend under a
//! single mutex: every trait method is one atomic step, so the concurrency
//! behaviour the matcher relies on (cancel-versus-match arbitration, skew
//! detection) is preserved. Used by tests and local development.

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::Utc;
use common::{OrderId, OrderStatus, Symbol};
use parking_lot::Mutex;

use crate::domain::{min_decimal, Order, Trade};
use crate::error::CancelError;
use crate::store::traits::{
    Accepted, OrderStore, StoreError, TradeUnit, TradeUnitError, UnitSkew,
};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
}

/// Mutex-guarded store with Postgres-equivalent semantics.
#[derive(Default)]
pub struct MemoryOrderStore {
    state: Mutex<MemoryState>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: total number of trades recorded.
    pub fn trade_count(&self) -> usize {
        self.state.lock().trades.len()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn accept(&self, order: Order) -> Result<Accepted, StoreError> {
        let mut state = self.state.lock();

        if let Some(key) = &order.idempotency_key {
            let existing = state
                .orders
                .values()
                .find(|candidate| candidate.idempotency_key.as_ref() == Some(key));
            if let Some(existing) = existing {
                return Ok(Accepted::Replayed(existing.clone()));
            }
        }

        state.orders.insert(order.id, order.clone());
        Ok(Accepted::New(order))
    }

    async fn execute_trade_unit(&self, unit: TradeUnit<'_>) -> Result<(), TradeUnitError> {
        let mut state = self.state.lock();

        let incoming = state
            .orders
            .get(&unit.incoming_id)
            .ok_or(StoreError::OrderNotFound(unit.incoming_id))?;
        let resting = state
            .orders
            .get(&unit.resting_id)
            .ok_or(StoreError::OrderNotFound(unit.resting_id))?;

        let quantity = &unit.trade.quantity;
        let skewed = !incoming.status.is_active()
            || !resting.status.is_active()
            || quantity > &incoming.remaining
            || quantity > &resting.remaining
            || &incoming.remaining - quantity != *unit.new_incoming_remaining
            || &resting.remaining - quantity != *unit.new_resting_remaining;

        if skewed {
            return Err(TradeUnitError::Skew(UnitSkew {
                incoming_remaining: incoming.remaining.clone(),
                incoming_active: incoming.status.is_active(),
                resting_remaining: resting.remaining.clone(),
                resting_active: resting.status.is_active(),
            }));
        }

        let now = Utc::now();
        for (id, new_remaining) in [
            (unit.incoming_id, unit.new_incoming_remaining),
            (unit.resting_id, unit.new_resting_remaining),
        ] {
            let row = state.orders.get_mut(&id).expect("row checked above");
            row.remaining = new_remaining.clone();
            row.status = if row.remaining.is_zero() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            row.updated_at = now;
        }
        state.trades.push(unit.trade.clone());

        Ok(())
    }

    async fn cancel(&self, order_id: OrderId) -> Result<Order, CancelError> {
        let mut state = self.state.lock();

        let row = state
            .orders
            .get_mut(&order_id)
            .ok_or(CancelError::NotFound(order_id))?;

        match row.status {
            OrderStatus::Filled => Err(CancelError::AlreadyFilled(order_id)),
            OrderStatus::Cancelled => Err(CancelError::AlreadyCancelled(order_id)),
            OrderStatus::Open | OrderStatus::PartiallyFilled => {
                row.status = OrderStatus::Cancelled;
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
        }
    }

    async fn finalize_incoming(
        &self,
        order_id: OrderId,
        computed_remaining: &BigDecimal,
    ) -> Result<Order, StoreError> {
        let mut state = self.state.lock();

        let row = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        row.remaining = min_decimal(&row.remaining, computed_remaining);
        if row.status != OrderStatus::Cancelled {
            row.status = if row.remaining.is_zero() {
                OrderStatus::Filled
            } else if row.remaining < row.quantity {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Open
            };
        }
        row.updated_at = Utc::now();

        Ok(row.clone())
    }

    async fn load_open(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock();
        let mut open: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.is_resting_eligible())
            .cloned()
            .collect();
        open.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(open)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().orders.get(&order_id).cloned())
    }

    async fn trades_for_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .filter(|trade| trade.involves(order_id))
            .cloned()
            .collect())
    }

    async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .state
            .lock()
            .trades
            .iter()
            .rev()
            .filter(|trade| &trade.instrument == instrument)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewOrder;
    use common::Side;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn expect_new(accepted: Accepted) -> Order {
        match accepted {
            Accepted::New(order) => order,
            Accepted::Replayed(_) => panic!("expected fresh acceptance"),
        }
    }

    async fn accepted_limit(
        store: &MemoryOrderStore,
        side: Side,
        price: &str,
        qty: &str,
    ) -> Order {
        let order = NewOrder::limit("alice", "BTC-USD", side, dec(price), dec(qty))
            .into_order()
            .unwrap();
        expect_new(store.accept(order).await.unwrap())
    }

    #[tokio::test]
    async fn test_idempotency_key_replays() {
        let store = MemoryOrderStore::new();
        let first = NewOrder::limit("alice", "BTC-USD", Side::Buy, dec("100"), dec("1"))
            .with_idempotency_key("k-1")
            .into_order()
            .unwrap();
        let first = expect_new(store.accept(first).await.unwrap());

        let retry = NewOrder::limit("alice", "BTC-USD", Side::Buy, dec("100"), dec("1"))
            .with_idempotency_key("k-1")
            .into_order()
            .unwrap();
        match store.accept(retry).await.unwrap() {
            Accepted::Replayed(order) => assert_eq!(order.id, first.id),
            Accepted::New(_) => panic!("duplicate key must replay"),
        }
    }

    #[tokio::test]
    async fn test_trade_unit_commits_and_moves_both_legs() {
        let store = MemoryOrderStore::new();
        let buy = accepted_limit(&store, Side::Buy, "100", "5").await;
        let sell = accepted_limit(&store, Side::Sell, "100", "3").await;

        let trade = Trade::between(
            Symbol::new("BTC-USD"),
            buy.id,
            Side::Buy,
            sell.id,
            dec("100"),
            dec("3"),
        );
        store
            .execute_trade_unit(TradeUnit {
                trade: &trade,
                incoming_id: buy.id,
                resting_id: sell.id,
                new_incoming_remaining: &dec("2"),
                new_resting_remaining: &dec("0"),
            })
            .await
            .unwrap();

        let buy = store.get_order(buy.id).await.unwrap().unwrap();
        let sell = store.get_order(sell.id).await.unwrap().unwrap();
        assert_eq!(buy.status, OrderStatus::PartiallyFilled);
        assert_eq!(buy.remaining, dec("2"));
        assert_eq!(sell.status, OrderStatus::Filled);
        assert!(sell.remaining.is_zero());
        assert_eq!(store.trade_count(), 1);
    }

    #[tokio::test]
    async fn test_trade_unit_skews_after_cancel() {
        let store = MemoryOrderStore::new();
        let buy = accepted_limit(&store, Side::Buy, "100", "5").await;
        let sell = accepted_limit(&store, Side::Sell, "100", "5").await;

        store.cancel(sell.id).await.unwrap();

        let trade = Trade::between(
            Symbol::new("BTC-USD"),
            buy.id,
            Side::Buy,
            sell.id,
            dec("100"),
            dec("5"),
        );
        let err = store
            .execute_trade_unit(TradeUnit {
                trade: &trade,
                incoming_id: buy.id,
                resting_id: sell.id,
                new_incoming_remaining: &dec("0"),
                new_resting_remaining: &dec("0"),
            })
            .await
            .unwrap_err();

        match err {
            TradeUnitError::Skew(skew) => {
                assert!(!skew.resting_active);
                assert!(skew.incoming_active);
            }
            other => panic!("expected skew, got {other:?}"),
        }
        // rollback: nothing recorded, legs untouched
        assert_eq!(store.trade_count(), 0);
        let buy = store.get_order(buy.id).await.unwrap().unwrap();
        assert_eq!(buy.remaining, dec("5"));
    }

    #[tokio::test]
    async fn test_cancel_refusals() {
        let store = MemoryOrderStore::new();
        let order = accepted_limit(&store, Side::Buy, "100", "1").await;

        store.cancel(order.id).await.unwrap();
        assert!(matches!(
            store.cancel(order.id).await,
            Err(CancelError::AlreadyCancelled(_))
        ));
        assert!(matches!(
            store.cancel(OrderId::new()).await,
            Err(CancelError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_takes_minimum_and_keeps_cancelled() {
        let store = MemoryOrderStore::new();
        let order = accepted_limit(&store, Side::Buy, "100", "5").await;

        let finalized = store.finalize_incoming(order.id, &dec("3")).await.unwrap();
        assert_eq!(finalized.remaining, dec("3"));
        assert_eq!(finalized.status, OrderStatus::PartiallyFilled);

        store.cancel(order.id).await.unwrap();
        let finalized = store.finalize_incoming(order.id, &dec("2")).await.unwrap();
        assert_eq!(finalized.status, OrderStatus::Cancelled);
        assert_eq!(finalized.remaining, dec("2"));
    }

    #[tokio::test]
    async fn test_load_open_is_creation_ordered_and_filtered() {
        let store = MemoryOrderStore::new();
        let first = accepted_limit(&store, Side::Buy, "100", "1").await;
        let second = accepted_limit(&store, Side::Buy, "101", "1").await;
        let cancelled = accepted_limit(&store, Side::Sell, "102", "1").await;
        store.cancel(cancelled.id).await.unwrap();

        let open = store.load_open().await.unwrap();
        let ids: Vec<OrderId> = open.iter().map(|order| order.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }
}
