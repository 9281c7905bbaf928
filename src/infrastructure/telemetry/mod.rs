//! Tracing Initialization
//!
//! Configures structured logging for the daemon. Log level defaults to
//! `info` for this crate and can be overridden with `RUST_LOG`.
//!
//! # Usage
//!
//! ```ignore
//! use ticker_collector::infrastructure::telemetry;
//!
//! // Initialize once at startup.
//! telemetry::init();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Composes an environment filter with a compact fmt layer. Safe to call
/// once; later calls are ignored (the first subscriber wins).
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ticker_collector=info,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
