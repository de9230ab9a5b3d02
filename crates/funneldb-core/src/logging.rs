//! Logging setup for funnel tooling.
//!
//! The library only emits `tracing` events; binaries and tests call one of
//! these to install a subscriber.

use tracing_subscriber::{fmt, prelude::*, util::TryInitError, EnvFilter};

/// Initialize tracing with the default `info` filter.
///
/// Sets up tracing-subscriber with:
/// - Environment filter (RUST_LOG)
/// - Compact format suitable for terminal output
pub fn init() {
    init_with_filter("info");
}

/// Initialize tracing with a custom default filter.
///
/// Panics if a global subscriber is already installed.
pub fn init_with_filter(default_filter: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().compact())
        .init();
}

/// Like [`init_with_filter`], but reports an existing subscriber as an error.
///
/// Tests share one process, so each test can call this and ignore the
/// error.
pub fn try_init_with_filter(default_filter: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(fmt::layer().compact().with_test_writer())
        .try_init()
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}
