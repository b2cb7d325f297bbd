//! Tracing setup.
//!
//! No metrics backend is wired here (out of scope for this core); a single
//! `tracing_subscriber::fmt` layer, filterable with `RUST_LOG`, is enough for
//! local runs and log aggregation alike.

use tracing_subscriber::EnvFilter;

pub struct Telemetry;

impl Telemetry {
    /// Installs the global `tracing` subscriber. Call once at startup.
    pub fn init() -> Self {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .init();
        Self
    }
}
