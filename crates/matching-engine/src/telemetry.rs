//! Metric names recorded by the kernel
//!
//! Recorded through the `metrics` facade; the binary installs the
//! Prometheus exporter. Names are stable, dashboards depend on them.

pub const ORDERS_ACCEPTED: &str = "engine_orders_accepted_total";
pub const ORDERS_REPLAYED: &str = "engine_orders_replayed_total";
pub const ORDERS_REJECTED: &str = "engine_orders_rejected_total";
pub const TRADES_COMMITTED: &str = "engine_trades_committed_total";
pub const UNIT_RETRIES: &str = "engine_unit_retries_total";
pub const CANCELS_ACCEPTED: &str = "engine_cancels_accepted_total";
pub const CANCELS_REFUSED: &str = "engine_cancels_refused_total";
pub const MATCH_SECONDS: &str = "engine_match_duration_seconds";
