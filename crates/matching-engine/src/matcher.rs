//! Price-time matching
//!
//! The drain loop owns one instrument's serialization token and processes
//! arrivals strictly in enqueue order. Every fill is one durability unit:
//! the trade row and both legs' remaining/status commit in a single store
//! transaction, and only a committed unit is reflected back into the
//! in-memory book. A failed unit leaves both memory and durable state at
//! the pre-unit snapshot.

use std::sync::Arc;
use std::time::Instant;

use bigdecimal::{BigDecimal, Zero};
use common::{OrderType, Side};
use config::MatchingConfig;
use metrics::{counter, histogram};
use tracing::{debug, warn};

use crate::book::BookEntry;
use crate::domain::{min_decimal, Order, Trade};
use crate::error::{CancelError, SubmitError};
use crate::instrument::{Arrival, InstrumentBook};
use crate::result::SubmitReceipt;
use crate::store::{OrderStore, StoreError, TradeUnit, TradeUnitError};
use crate::telemetry;

/// How one durability unit attempt resolved.
enum UnitOutcome {
    Committed { trade: Trade, new_resting: BigDecimal },
    /// The resting row was drained or cancelled underneath us; drop it from
    /// memory and move to the next counterparty.
    RestingGone,
    /// The incoming row itself is no longer fillable (concurrent cancel).
    IncomingHalted,
}

/// Drain the arrival queue until it is observed empty while holding the
/// serialization token. Spawned by the submitter that wins the latch.
pub(crate) async fn drain(
    book: Arc<InstrumentBook>,
    store: Arc<dyn OrderStore>,
    config: MatchingConfig,
) {
    loop {
        let Some(Arrival { order, reply }) = book.next_arrival() else {
            if book.release_or_continue() {
                continue;
            }
            break;
        };

        let order_id = order.id;
        let started = Instant::now();
        let result = match_incoming(&book, store.as_ref(), order, &config).await;
        histogram!(telemetry::MATCH_SECONDS).record(started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            warn!(
                order_id = %order_id,
                instrument = %book.symbol(),
                %error,
                "Matching pass surfaced an error"
            );
        }
        // The submitter may have given up and dropped the receiver.
        let _ = reply.send(result);
    }
}

/// Whether the incoming order crosses a resting price on the opposite side.
fn crosses(incoming: &Order, resting_price: &BigDecimal) -> bool {
    match (incoming.order_type, &incoming.price) {
        (OrderType::Market, _) => true,
        (OrderType::Limit, Some(limit)) => match incoming.side {
            Side::Buy => resting_price <= limit,
            Side::Sell => resting_price >= limit,
        },
        // validation guarantees limit orders carry a price
        (OrderType::Limit, None) => false,
    }
}

/// Match one incoming order against the opposite side book.
async fn match_incoming(
    book: &InstrumentBook,
    store: &dyn OrderStore,
    mut incoming: Order,
    config: &MatchingConfig,
) -> Result<SubmitReceipt, SubmitError> {
    let mut trades = Vec::new();

    // Rest the limit order before matching: it cannot cross its own side,
    // and an interruption leaves memory consistent with the accepted row.
    if let Some(entry) = BookEntry::from_order(&incoming) {
        book.with_state(|state| state.insert(incoming.side, entry));
    }

    let mut halted = false;

    while !incoming.remaining.is_zero() && !halted {
        // Probe the opposite best under the lock; clone out so the lock is
        // never held across the durability unit.
        let resting = book.with_state(|state| {
            state.side(incoming.side.opposite()).peek_best().cloned()
        });
        let Some(resting) = resting else { break };

        if !crosses(&incoming, &resting.price) {
            break;
        }

        let mut resting_remaining = resting.remaining.clone();
        let mut quantity = min_decimal(&incoming.remaining, &resting_remaining);
        let mut attempt = 0u32;

        let outcome = loop {
            attempt += 1;
            let trade = Trade::between(
                incoming.instrument.clone(),
                incoming.id,
                incoming.side,
                resting.id,
                resting.price.clone(),
                quantity.clone(),
            );
            let new_incoming = &incoming.remaining - &quantity;
            let new_resting = &resting_remaining - &quantity;

            let unit = TradeUnit {
                trade: &trade,
                incoming_id: incoming.id,
                resting_id: resting.id,
                new_incoming_remaining: &new_incoming,
                new_resting_remaining: &new_resting,
            };
            match store.execute_trade_unit(unit).await {
                Ok(()) => break UnitOutcome::Committed { trade, new_resting },
                Err(TradeUnitError::Skew(skew)) => {
                    counter!(telemetry::UNIT_RETRIES).increment(1);
                    if !skew.resting_active || skew.resting_remaining.is_zero() {
                        break UnitOutcome::RestingGone;
                    }
                    if !skew.incoming_active {
                        break UnitOutcome::IncomingHalted;
                    }
                    if attempt > config.max_unit_retries {
                        return Err(SubmitError::UnitRetriesExhausted {
                            order_id: incoming.id,
                            attempts: attempt,
                        });
                    }
                    // Quantities moved underneath us; the durable view wins.
                    debug!(
                        order_id = %incoming.id,
                        resting_id = %resting.id,
                        attempt,
                        "Durability unit skewed, retrying with durable quantities"
                    );
                    incoming.remaining = skew.incoming_remaining.clone();
                    resting_remaining = skew.resting_remaining.clone();
                    quantity = min_decimal(&incoming.remaining, &resting_remaining);
                }
                Err(TradeUnitError::Store(error)) => {
                    counter!(telemetry::UNIT_RETRIES).increment(1);
                    if attempt > config.max_unit_retries {
                        return Err(error.into());
                    }
                    warn!(
                        order_id = %incoming.id,
                        attempt,
                        %error,
                        "Durability unit failed, retrying"
                    );
                }
            }
        };

        match outcome {
            UnitOutcome::Committed { trade, new_resting } => {
                incoming.fill(&quantity);
                book.with_state(|state| {
                    if new_resting.is_zero() {
                        state.remove(resting.id);
                    } else {
                        state.set_remaining(resting.id, new_resting.clone());
                    }
                    if incoming.remaining.is_zero() {
                        state.remove(incoming.id);
                    } else {
                        state.set_remaining(incoming.id, incoming.remaining.clone());
                    }
                });
                counter!(telemetry::TRADES_COMMITTED).increment(1);
                debug!(
                    trade_id = %trade.id,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    "Trade committed"
                );
                trades.push(trade);
            }
            UnitOutcome::RestingGone => {
                book.with_state(|state| {
                    state.remove(resting.id);
                });
            }
            UnitOutcome::IncomingHalted => halted = true,
        }
    }

    // Market residue is never rested: cancel whatever is left.
    if incoming.order_type == OrderType::Market && !incoming.remaining.is_zero() {
        match store.cancel(incoming.id).await {
            Ok(_) => debug!(order_id = %incoming.id, "Market residue cancelled"),
            // a concurrent cancel or a final fill got there first
            Err(CancelError::AlreadyCancelled(_)) | Err(CancelError::AlreadyFilled(_)) => {}
            Err(CancelError::NotFound(id)) => {
                return Err(SubmitError::Store(StoreError::OrderNotFound(id)));
            }
            Err(CancelError::Store(error)) => return Err(error.into()),
        }
    }

    // Final reconciliation: the durable row is authoritative; take the
    // minimum against the in-memory computation (defensive against a
    // concurrent cancel that landed mid-pass).
    let order = store.finalize_incoming(incoming.id, &incoming.remaining).await?;

    book.with_state(|state| {
        if order.is_resting_eligible() {
            state.set_remaining(order.id, order.remaining.clone());
        } else {
            state.remove(order.id);
        }
        debug_assert!(!state.is_crossed(), "book crossed at quiescence");
    });

    Ok(SubmitReceipt { order, trades })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewOrder;
    use crate::store::{Accepted, MemoryOrderStore};
    use common::{OrderStatus, Symbol};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn config() -> MatchingConfig {
        MatchingConfig::default()
    }

    async fn accept(store: &MemoryOrderStore, order: Order) -> Order {
        match store.accept(order).await.unwrap() {
            Accepted::New(order) => order,
            Accepted::Replayed(_) => panic!("unexpected replay"),
        }
    }

    #[test]
    fn test_cross_predicate() {
        let buy = NewOrder::limit("a", "BTC-USD", Side::Buy, dec("100"), dec("1"))
            .into_order()
            .unwrap();
        assert!(crosses(&buy, &dec("99")));
        assert!(crosses(&buy, &dec("100.00")));
        assert!(!crosses(&buy, &dec("100.5")));

        let sell = NewOrder::limit("a", "BTC-USD", Side::Sell, dec("100"), dec("1"))
            .into_order()
            .unwrap();
        assert!(crosses(&sell, &dec("101")));
        assert!(crosses(&sell, &dec("100")));
        assert!(!crosses(&sell, &dec("99.99")));

        let market = NewOrder::market("a", "BTC-USD", Side::Buy, dec("1"))
            .into_order()
            .unwrap();
        assert!(crosses(&market, &dec("1000000")));
    }

    #[tokio::test]
    async fn test_durably_cancelled_resting_order_is_skipped() {
        let store = MemoryOrderStore::new();
        let book = InstrumentBook::new(Symbol::new("BTC-USD"));

        // a resting ask, present in memory but cancelled durably: the
        // in-memory book lags a cancel that has already won arbitration
        let ask = accept(
            &store,
            NewOrder::limit("maker", "BTC-USD", Side::Sell, dec("100"), dec("10"))
                .into_order()
                .unwrap(),
        )
        .await;
        let entry = BookEntry::from_order(&ask).unwrap();
        book.with_state(|state| state.insert(Side::Sell, entry));
        store.cancel(ask.id).await.unwrap();

        let buy = accept(
            &store,
            NewOrder::limit("taker", "BTC-USD", Side::Buy, dec("100"), dec("10"))
                .into_order()
                .unwrap(),
        )
        .await;

        let receipt = match_incoming(&book, &store, buy, &config()).await.unwrap();

        // no fill against the cancelled row; the buy rests instead
        assert!(receipt.trades.is_empty());
        assert_eq!(receipt.order.status, OrderStatus::Open);
        let snapshot = book.snapshot(10);
        assert_eq!(snapshot.best_bid(), Some(&dec("100")));
        assert!(snapshot.asks.is_empty(), "cancelled ask evicted from memory");
    }

    #[tokio::test]
    async fn test_incoming_cancelled_mid_book_walk_is_halted() {
        let store = MemoryOrderStore::new();
        let book = InstrumentBook::new(Symbol::new("BTC-USD"));

        let ask = accept(
            &store,
            NewOrder::limit("maker", "BTC-USD", Side::Sell, dec("100"), dec("5"))
                .into_order()
                .unwrap(),
        )
        .await;
        book.with_state(|state| state.insert(Side::Sell, BookEntry::from_order(&ask).unwrap()));

        // the incoming buy is cancelled durably before the matcher runs;
        // the drain observes the inactive row at its first unit
        let buy = accept(
            &store,
            NewOrder::limit("taker", "BTC-USD", Side::Buy, dec("100"), dec("5"))
                .into_order()
                .unwrap(),
        )
        .await;
        store.cancel(buy.id).await.unwrap();

        let receipt = match_incoming(&book, &store, buy, &config()).await.unwrap();

        assert!(receipt.trades.is_empty());
        assert_eq!(receipt.order.status, OrderStatus::Cancelled);
        // the cancelled incoming order must not be left resting
        assert!(book.snapshot(10).bids.is_empty());
        // the untouched ask is still there
        assert_eq!(book.snapshot(10).best_ask(), Some(&dec("100")));
    }
}
