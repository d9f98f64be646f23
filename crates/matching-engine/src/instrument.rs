//! Per-instrument book state and matcher serialization
//!
//! Each instrument owns its two side books, an id locator index for
//! cancellation, an arrival queue and the `matcher_active` latch. The
//! latch plus the queue form a single-consumer wakeup: submitters enqueue
//! then test-and-set; the winner runs the drain loop, losers return
//! immediately. The book mutex is only ever held for synchronous segments,
//! never across an await.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use bigdecimal::BigDecimal;
use chrono::Utc;
use common::{OrderId, Side, Symbol};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::book::{BookEntry, SideBook};
use crate::domain::{BookSnapshot, Order};
use crate::error::SubmitError;
use crate::result::SubmitReceipt;

/// Both side books plus the id → (side, price) locator index.
///
/// The locator gives cancellation its fast path without back-pointers from
/// entries to levels.
pub(crate) struct BookState {
    bids: SideBook,
    asks: SideBook,
    locators: HashMap<OrderId, (Side, BigDecimal)>,
}

impl BookState {
    fn new() -> Self {
        Self {
            bids: SideBook::new(Side::Buy),
            asks: SideBook::new(Side::Sell),
            locators: HashMap::new(),
        }
    }

    pub fn side(&self, side: Side) -> &SideBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut SideBook {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rest an entry on the given side, keeping the locator in sync.
    pub fn insert(&mut self, side: Side, entry: BookEntry) {
        self.locators.insert(entry.id, (side, entry.price.clone()));
        self.side_mut(side).insert(entry);
    }

    /// Remove an order wherever it rests. Unknown ids are a no-op, so the
    /// matcher and a concurrent cancel can both try without coordination.
    pub fn remove(&mut self, id: OrderId) -> Option<BookEntry> {
        let (side, price) = self.locators.remove(&id)?;
        self.side_mut(side).remove(id, &price)
    }

    /// Refresh an entry's remaining after a committed durability unit.
    pub fn set_remaining(&mut self, id: OrderId, remaining: BigDecimal) -> bool {
        let Some((side, price)) = self.locators.get(&id) else {
            return false;
        };
        let (side, price) = (*side, price.clone());
        self.side_mut(side).set_remaining(id, &price, remaining)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.locators.contains_key(&id)
    }

    /// A crossed book (best_bid >= best_ask) at quiescence means the
    /// matcher stopped too early.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    pub fn order_count(&self) -> usize {
        self.bids.order_count() + self.asks.order_count()
    }
}

/// A queued submission awaiting the matcher, with its reply channel.
pub(crate) struct Arrival {
    pub order: Order,
    pub reply: oneshot::Sender<Result<SubmitReceipt, SubmitError>>,
}

/// One instrument's book, arrival queue and serialization latch.
pub struct InstrumentBook {
    symbol: Symbol,
    state: Mutex<BookState>,
    arrivals: Mutex<VecDeque<Arrival>>,
    matcher_active: AtomicBool,
}

impl InstrumentBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            state: Mutex::new(BookState::new()),
            arrivals: Mutex::new(VecDeque::new()),
            matcher_active: AtomicBool::new(false),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Enqueue an arrival. Returns true when the caller won the activation
    /// race and must launch the drain loop; the enqueue happens before the
    /// test-and-set so a running matcher is guaranteed to observe it.
    pub(crate) fn enqueue(&self, arrival: Arrival) -> bool {
        self.arrivals.lock().push_back(arrival);
        self.try_activate()
    }

    fn try_activate(&self) -> bool {
        self.matcher_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Pop the next arrival. Only the active matcher calls this.
    pub(crate) fn next_arrival(&self) -> Option<Arrival> {
        self.arrivals.lock().pop_front()
    }

    /// Called when the queue was observed empty while still holding the
    /// token. Releases the token, then re-checks the queue: an arrival that
    /// raced in after the empty observation lost its activation attempt to
    /// us, so we must reacquire and keep draining. Returns true to continue.
    pub(crate) fn release_or_continue(&self) -> bool {
        self.matcher_active.store(false, Ordering::Release);
        !self.arrivals.lock().is_empty() && self.try_activate()
    }

    /// Run a synchronous closure against the book state.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut BookState) -> R) -> R {
        f(&mut self.state.lock())
    }

    /// Drop an order from the in-memory book (cancellation path; the
    /// durable cancel has already committed).
    pub(crate) fn remove_entry(&self, id: OrderId) -> Option<BookEntry> {
        self.state.lock().remove(id)
    }

    /// Consistent aggregated view; taking the book lock excludes matcher
    /// mutation for the duration.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let state = self.state.lock();
        BookSnapshot {
            instrument: self.symbol.clone(),
            bids: state.side(Side::Buy).depth(depth),
            asks: state.side(Side::Sell).depth(depth),
            taken_at: Utc::now(),
        }
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().order_count()
    }
}
