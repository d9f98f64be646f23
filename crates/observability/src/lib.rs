//! Observability infrastructure for Matchbook
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics exporter bootstrap
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("matchbook", LogFormat::Json)?;
//! observability::metrics::init_metrics(9090)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat};
pub use metrics::init_metrics;
