//! Storage backends for the matching kernel
//!
//! [`traits::OrderStore`] is the durability contract; the Postgres backend
//! is authoritative in production and the in-memory backend mirrors its
//! semantics for tests and local development.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use traits::{Accepted, OrderStore, StoreError, TradeUnit, TradeUnitError, UnitSkew};
