//! Prometheus metrics bootstrap
//!
//! The kernel records its counters and histograms through the `metrics`
//! facade; installing the exporter here makes them visible at
//! `/metrics` on the configured port. When the exporter is not installed
//! the facade macros are no-ops, so recording is always safe.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter with an HTTP listener.
///
/// Must be called from within a tokio runtime; the exporter serves
/// `/metrics` on `0.0.0.0:{port}`.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}
