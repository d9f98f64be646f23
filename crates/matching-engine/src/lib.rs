//! Durable order matching kernel for Matchbook
//!
//! A continuous-limit-order-book matching engine for a multi-instrument
//! exchange. Per instrument it maintains a two-sided price book of resting
//! limit orders and pairs crossing orders into trades by price-time
//! priority.
//!
//! # Guarantees
//!
//! - At most one matcher is active per instrument; submissions on one
//!   instrument match strictly in arrival order. Distinct instruments
//!   match concurrently.
//! - Every fill is one durable transaction covering the trade row and both
//!   legs' remaining/status. The in-memory book is only mutated after the
//!   transaction commits, so a crash never leaves memory ahead of disk.
//! - Cancellation competes with matching for the same row-level exclusion;
//!   the durable store is the arbiter, and exactly one of them wins any
//!   given quantity.
//! - Restart rebuilds the books from the persisted open limit orders in
//!   creation order, without matching.
//!
//! # Example
//!
//! ```ignore
//! use matching_engine::{Exchange, MemoryOrderStore, NewOrder};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let exchange = Exchange::new(
//!         Arc::new(MemoryOrderStore::new()),
//!         config::MatchingConfig::default(),
//!     );
//!     exchange.recover().await.unwrap();
//!
//!     let receipt = exchange
//!         .submit(NewOrder::limit("alice", "BTC-USD", common::Side::Sell,
//!             "100".parse().unwrap(), "10".parse().unwrap()))
//!         .await
//!         .unwrap();
//!     println!("trades: {}", receipt.trades.len());
//! }
//! ```

pub mod book;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod instrument;
mod matcher;
mod recovery;
pub mod result;
pub mod store;
pub mod telemetry;

pub use domain::{BookSnapshot, NewOrder, Order, PriceLevel, Trade};
pub use error::{CancelError, SubmitError, ValidationError};
pub use exchange::Exchange;
pub use instrument::InstrumentBook;
pub use result::{RecoveryStats, SubmitReceipt};
pub use store::{
    Accepted, MemoryOrderStore, OrderStore, PostgresOrderStore, StoreError, TradeUnit,
    TradeUnitError, UnitSkew,
};
