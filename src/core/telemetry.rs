//! Tracing subscriber setup.
//!
//! Human-readable logs to stderr, filtered by `RUST_LOG` or the configured level.

use crate::core::config::TelemetryConfig;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. Safe to call more than once; later calls are ignored.
pub fn init(config: &TelemetryConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}
