//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/telemetry. Users can install their own subscriber; this
/// helper installs a default env-based subscriber if none is set.
pub fn init_tracing() {
    init_tracing_with_level("info");
}

/// Like [`init_tracing`], but falls back to `level` when `RUST_LOG` is not set.
///
/// `level` is usually the configured `LogLevel` of the dispatcher.
pub fn init_tracing_with_level(level: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
