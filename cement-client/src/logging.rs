//! Tracing subscriber setup for applications embedding the client.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application. This helper covers the common case.

use tracing_subscriber::EnvFilter;

use crate::config::ClientConfig;

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // Already set by the application or an earlier call
    let _ = subscriber.try_init();
}

/// Initialize logging from a config's `log_level`.
pub fn init_from_config(config: &ClientConfig) {
    init_subscriber(&config.log_level);
}
