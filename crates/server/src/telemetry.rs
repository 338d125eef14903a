//! Tracing and metrics bootstrap.

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

/// Structured JSON logs in production, human-readable otherwise.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(is_production: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if is_production {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

/// Expose the Prometheus scrape endpoint.
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}
