//! Tracing setup shared by the lookin binaries and test suites.

use tracing_subscriber::{EnvFilter, fmt};

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Installs the global fmt subscriber, honouring `RUST_LOG` and falling back to `info`.
///
/// Panics if a global subscriber is already installed; binaries call this once from `main`.
pub fn init_tracing() {
    fmt()
        .with_env_filter(env_filter("info"))
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Like [`init_tracing`] but writes through the test harness capture and tolerates
/// repeated calls, so every test can invoke it.
pub fn init_test_tracing() {
    let _ = fmt()
        .with_env_filter(env_filter("debug"))
        .with_target(true)
        .with_test_writer()
        .try_init();
}
