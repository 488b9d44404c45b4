//! Structured logging.
//!
//! Library code never calls `println!`/`eprintln!`; it emits `tracing`
//! events and spans at module boundaries (container load, scheduler batch
//! dispatch, constraint violations, cancellation) and leaves the subscriber
//! wiring to `init_tracing`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the default subscriber: stderr, env-filtered, human-readable.
pub fn init_tracing() {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("quinfer=debug".parse().unwrap())
        .add_directive("info".parse().unwrap());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Logging system initialized");
}

/// Initialize logging for tests with verbose output
///
/// Sets up logging specifically for test environments with:
/// - Debug level for all crate code
/// - Captured output for test harness
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
