//! Dispatch and registry
//!
//! Maps instrument symbols to their books, lazily populated, and routes
//! submissions, cancellations and queries. Distinct instruments match
//! concurrently; a single instrument is strictly serial through its
//! arrival queue.

use std::collections::HashMap;
use std::sync::Arc;

use common::{OrderId, Symbol};
use config::MatchingConfig;
use metrics::counter;
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::info;

use crate::domain::{BookSnapshot, NewOrder, Order, Trade};
use crate::error::{CancelError, SubmitError};
use crate::instrument::{Arrival, InstrumentBook};
use crate::matcher;
use crate::result::SubmitReceipt;
use crate::store::{Accepted, OrderStore, StoreError};
use crate::telemetry;

/// The kernel's public face: submit, cancel, snapshot, trade queries.
pub struct Exchange {
    store: Arc<dyn OrderStore>,
    books: RwLock<HashMap<Symbol, Arc<InstrumentBook>>>,
    matching: MatchingConfig,
}

impl Exchange {
    pub fn new(store: Arc<dyn OrderStore>, matching: MatchingConfig) -> Self {
        Self {
            store,
            books: RwLock::new(HashMap::new()),
            matching,
        }
    }

    pub(crate) fn store_ref(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Locate or lazily create the instrument's book.
    pub(crate) fn book(&self, symbol: &Symbol) -> Arc<InstrumentBook> {
        if let Some(book) = self.books.read().get(symbol) {
            return Arc::clone(book);
        }
        let mut books = self.books.write();
        Arc::clone(
            books
                .entry(symbol.clone())
                .or_insert_with(|| Arc::new(InstrumentBook::new(symbol.clone()))),
        )
    }

    fn existing_book(&self, symbol: &Symbol) -> Option<Arc<InstrumentBook>> {
        self.books.read().get(symbol).cloned()
    }

    /// Submit an order: validate, persist the acceptance, enqueue for the
    /// instrument's matcher and wait for the matching pass to finish.
    ///
    /// A duplicate idempotency key returns the previously accepted order
    /// and its trades without touching the matcher.
    pub async fn submit(&self, new_order: NewOrder) -> Result<SubmitReceipt, SubmitError> {
        let order = match new_order.into_order() {
            Ok(order) => order,
            Err(error) => {
                counter!(telemetry::ORDERS_REJECTED).increment(1);
                return Err(error.into());
            }
        };

        match self.store.accept(order).await? {
            Accepted::Replayed(existing) => {
                counter!(telemetry::ORDERS_REPLAYED).increment(1);
                info!(order_id = %existing.id, "Submission replayed from idempotency key");
                let trades = self.store.trades_for_order(existing.id).await?;
                Ok(SubmitReceipt {
                    order: existing,
                    trades,
                })
            }
            Accepted::New(order) => {
                counter!(telemetry::ORDERS_ACCEPTED).increment(1);
                info!(
                    order_id = %order.id,
                    instrument = %order.instrument,
                    side = %order.side,
                    order_type = %order.order_type,
                    quantity = %order.quantity,
                    "Order accepted"
                );

                let book = self.book(&order.instrument);
                let (reply, receipt_rx) = oneshot::channel();
                if book.enqueue(Arrival { order, reply }) {
                    tokio::spawn(matcher::drain(
                        Arc::clone(&book),
                        Arc::clone(&self.store),
                        self.matching.clone(),
                    ));
                }
                let receipt = receipt_rx.await.map_err(|_| SubmitError::ReplyDropped)??;
                if receipt.has_trades() {
                    info!(
                        order_id = %receipt.order.id,
                        trades = receipt.trades.len(),
                        executed = %receipt.executed_quantity(),
                        status = %receipt.order.status,
                        "Matching pass produced trades"
                    );
                }
                Ok(receipt)
            }
        }
    }

    /// Cancel an order. The durable store arbitrates against a concurrent
    /// matching pass; memory is updated only after the durable cancel
    /// commits. The symbol hint skips an order lookup when provided.
    pub async fn cancel(
        &self,
        order_id: OrderId,
        instrument: Option<&Symbol>,
    ) -> Result<Order, CancelError> {
        let symbol = match instrument {
            Some(symbol) => symbol.clone(),
            None => match self.store.get_order(order_id).await? {
                Some(order) => order.instrument,
                None => {
                    counter!(telemetry::CANCELS_REFUSED).increment(1);
                    return Err(CancelError::NotFound(order_id));
                }
            },
        };

        match self.store.cancel(order_id).await {
            Ok(cancelled) => {
                counter!(telemetry::CANCELS_ACCEPTED).increment(1);
                if let Some(book) = self.existing_book(&symbol) {
                    book.remove_entry(order_id);
                }
                info!(order_id = %order_id, instrument = %symbol, "Order cancelled");
                Ok(cancelled)
            }
            Err(error) => {
                if !matches!(error, CancelError::Store(_)) {
                    counter!(telemetry::CANCELS_REFUSED).increment(1);
                }
                Err(error)
            }
        }
    }

    /// Aggregated view of an instrument's book. Consistent per instrument;
    /// not isolated across instruments.
    pub fn book_snapshot(&self, instrument: &Symbol, depth: Option<usize>) -> BookSnapshot {
        let depth = depth.unwrap_or(self.matching.snapshot_depth);
        match self.existing_book(instrument) {
            Some(book) => book.snapshot(depth),
            None => BookSnapshot::empty(instrument.clone()),
        }
    }

    /// Read one order row from the durable store.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.store.get_order(order_id).await
    }

    /// Trades involving an order, oldest first. Served from the durable
    /// store; never touches the matcher.
    pub async fn trades_for_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        self.store.trades_for_order(order_id).await
    }

    /// Recent trades on an instrument, newest first.
    pub async fn trades_for_instrument(
        &self,
        instrument: &Symbol,
        limit: u32,
    ) -> Result<Vec<Trade>, StoreError> {
        self.store.trades_for_instrument(instrument, limit).await
    }

    /// Instruments with a live in-memory book.
    pub fn instruments(&self) -> Vec<Symbol> {
        self.books.read().keys().cloned().collect()
    }
}
