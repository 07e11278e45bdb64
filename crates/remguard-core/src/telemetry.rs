//! Tracing setup
//!
//! One-shot subscriber installation for binaries and long-lived test
//! harnesses. `RUST_LOG` overrides the configured level.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global tracing subscriber
///
/// Safe to call more than once; only the first call installs anything.
/// `json` switches the output format for log shippers.
pub fn init(default_level: &str, json: bool) {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }

    tracing::info!(level = default_level, json, "telemetry initialized");
}
