//! Telemetry helpers for structured logging of scheduler lifecycles.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "prometheus_coalesce=info";

/// Initialize tracing with [`DEFAULT_LOG_FILTER`] as the fallback filter.
/// Users can install their own subscriber; this is a no-op if one is set.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Install an env-filtered fmt subscriber, falling back to `fallback` when
/// `RUST_LOG` is unset. Returns true if this call installed the subscriber.
pub fn init_tracing_with(fallback: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
