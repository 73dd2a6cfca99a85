//! Structured logging bootstrap — the Rust-native replacement for the
//! original system's standalone `observability_validator.py`. Grounded on
//! `fourthplaces-mntogether`'s `tracing_subscriber::registry()` setup:
//! an `EnvFilter` seeded from `LOG_LEVEL` when `RUST_LOG` isn't set, a
//! single `fmt` layer, initialized exactly once per process.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global `tracing` subscriber. Call once from `main`
/// before any other component logs.
pub fn init(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
