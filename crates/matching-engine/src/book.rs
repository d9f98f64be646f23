//! Price levels and side books
//!
//! A side book keeps one [`Level`] per distinct price in a `BTreeMap`, so
//! level insertion is O(log n) and the best price is one end of the map:
//! bids read from the back (highest), asks from the front (lowest). Within a
//! level, entries are strictly FIFO by insertion; external timestamps never
//! reorder them.

use std::collections::{BTreeMap, VecDeque};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use common::{OrderId, Side};

use crate::domain::{Order, PriceLevel};

/// A resting order as held in memory. The durable row stays authoritative;
/// `remaining` here is refreshed after every committed durability unit.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub id: OrderId,
    pub price: BigDecimal,
    pub remaining: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl BookEntry {
    /// Build the in-memory representation of a resting-eligible order.
    pub fn from_order(order: &Order) -> Option<Self> {
        if !order.is_resting_eligible() {
            return None;
        }
        Some(Self {
            id: order.id,
            price: order.price.clone()?,
            remaining: order.remaining.clone(),
            created_at: order.created_at,
        })
    }
}

/// FIFO queue of entries resting at one price.
#[derive(Debug, Default)]
pub struct Level {
    entries: VecDeque<BookEntry>,
}

impl Level {
    fn push_back(&mut self, entry: BookEntry) {
        self.entries.push_back(entry);
    }

    fn peek_front(&self) -> Option<&BookEntry> {
        self.entries.front()
    }

    fn remove_by_id(&mut self, id: OrderId) -> Option<BookEntry> {
        let position = self.entries.iter().position(|entry| entry.id == id)?;
        self.entries.remove(position)
    }

    fn entry_mut(&mut self, id: OrderId) -> Option<&mut BookEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn total_remaining(&self) -> BigDecimal {
        self.entries
            .iter()
            .fold(BigDecimal::from(0), |acc, entry| acc + &entry.remaining)
    }
}

/// Price-ordered collection of levels for one side of an instrument.
#[derive(Debug)]
pub struct SideBook {
    side: Side,
    levels: BTreeMap<BigDecimal, Level>,
}

impl SideBook {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// The most aggressive resting price: highest for bids, lowest for asks.
    pub fn best_price(&self) -> Option<&BigDecimal> {
        match self.side {
            Side::Buy => self.levels.keys().next_back(),
            Side::Sell => self.levels.keys().next(),
        }
    }

    /// The oldest entry at the best price.
    pub fn peek_best(&self) -> Option<&BookEntry> {
        let best = match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        };
        best.and_then(Level::peek_front)
    }

    /// Place an entry at the back of its price level, creating the level if
    /// this is the first order at that price.
    pub fn insert(&mut self, entry: BookEntry) {
        self.levels
            .entry(entry.price.clone())
            .or_default()
            .push_back(entry);
    }

    /// Remove an entry; a level emptied by the removal is discarded so that
    /// no empty level ever exists.
    pub fn remove(&mut self, id: OrderId, price: &BigDecimal) -> Option<BookEntry> {
        let level = self.levels.get_mut(price)?;
        let removed = level.remove_by_id(id);
        if level.is_empty() {
            self.levels.remove(price);
        }
        removed
    }

    /// Refresh an entry's remaining quantity after a committed fill.
    pub fn set_remaining(&mut self, id: OrderId, price: &BigDecimal, remaining: BigDecimal) -> bool {
        match self.levels.get_mut(price).and_then(|level| level.entry_mut(id)) {
            Some(entry) => {
                entry.remaining = remaining;
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(Level::len).sum()
    }

    /// Aggregated top-of-book view, best level first.
    pub fn depth(&self, limit: usize) -> Vec<PriceLevel> {
        let levels: Box<dyn Iterator<Item = (&BigDecimal, &Level)> + '_> = match self.side {
            Side::Buy => Box::new(self.levels.iter().rev()),
            Side::Sell => Box::new(self.levels.iter()),
        };
        levels
            .take(limit)
            .map(|(price, level)| PriceLevel {
                price: price.clone(),
                quantity: level.total_remaining(),
                order_count: level.len(),
            })
            .collect()
    }
}
