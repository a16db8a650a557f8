//! Logging initialization for Lodestone applications.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with a default filter.
///
/// The `RUST_LOG` environment variable overrides the default.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();
}

/// Initialize logging for tests, ignoring repeated initialization.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}
