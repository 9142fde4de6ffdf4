//! Tests for utility functions

use prometheus_coalesce::util::{init_tracing, init_tracing_with, DEFAULT_LOG_FILTER};

#[test]
fn test_default_filter_targets_crate() {
    assert!(DEFAULT_LOG_FILTER.starts_with("prometheus_coalesce"));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    // A subscriber is installed now, so later calls leave it alone.
    assert!(!init_tracing_with("debug"));
}
