//! Common types for Matchbook
//!
//! This crate provides the shared domain vocabulary used across all
//! Matchbook crates: identifiers, sides, order types and statuses.

pub mod types;

pub use types::*;
