//! Tracing setup for the accompanying binaries.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber. Respects `RUST_LOG`,
/// defaulting to `info`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
