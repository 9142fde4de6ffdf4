//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use prometheus_coalesce::config::{
    SchedulerConfig, ENV_BETWEEN_EXECUTIONS_DELAY_MS, ENV_CAN_BE_DIRTY,
    ENV_EXECUTE_NON_DIRTY_IF_IDLE, MAX_BETWEEN_EXECUTIONS_DELAY_MS,
};

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let cfg = SchedulerConfig::default();
    assert_eq!(cfg.between_executions_delay_ms, 0);
    assert!(cfg.can_be_dirty);
    assert!(!cfg.should_execute_non_dirty_if_nothing_running);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_builder_methods() {
    let cfg = SchedulerConfig::default()
        .with_between_executions_delay_ms(1_500)
        .with_can_be_dirty(false)
        .with_execute_non_dirty_if_nothing_running(true);
    assert_eq!(cfg.between_executions_delay(), Duration::from_millis(1_500));
    assert!(!cfg.can_be_dirty);
    assert!(cfg.should_execute_non_dirty_if_nothing_running);
}

#[test]
fn test_delay_upper_bound() {
    let at_limit =
        SchedulerConfig::default().with_between_executions_delay_ms(MAX_BETWEEN_EXECUTIONS_DELAY_MS);
    assert!(at_limit.validate().is_ok());

    let over = at_limit.with_between_executions_delay_ms(MAX_BETWEEN_EXECUTIONS_DELAY_MS + 1);
    assert!(over.validate().is_err());
}

#[test]
fn test_from_json_str_partial() {
    let cfg = SchedulerConfig::from_json_str(r#"{ "between_executions_delay_ms": 300000, "can_be_dirty": false }"#)
        .expect("valid config");
    assert_eq!(cfg.between_executions_delay_ms, 300_000);
    assert!(!cfg.can_be_dirty);
    assert!(!cfg.should_execute_non_dirty_if_nothing_running);
}

#[test]
fn test_from_json_str_invalid() {
    assert!(SchedulerConfig::from_json_str("not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "between_executions_delay_ms": 999999999999 }"#).is_err());
}

#[test]
fn test_json_roundtrip_preserves_flags() {
    let cfg = SchedulerConfig::default().with_execute_non_dirty_if_nothing_running(true);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_from_lookup_reads_all_keys() {
    let cfg = SchedulerConfig::from_lookup(lookup_from(&[
        (ENV_BETWEEN_EXECUTIONS_DELAY_MS, " 2500 "),
        (ENV_CAN_BE_DIRTY, "no"),
        (ENV_EXECUTE_NON_DIRTY_IF_IDLE, "TRUE"),
    ]))
    .expect("valid env");
    assert_eq!(cfg.between_executions_delay_ms, 2_500);
    assert!(!cfg.can_be_dirty);
    assert!(cfg.should_execute_non_dirty_if_nothing_running);
}

#[test]
fn test_from_lookup_defaults_when_unset() {
    let cfg = SchedulerConfig::from_lookup(lookup_from(&[])).unwrap();
    assert_eq!(cfg, SchedulerConfig::default());
}

#[test]
fn test_from_lookup_rejects_bad_values() {
    let err = SchedulerConfig::from_lookup(lookup_from(&[(ENV_CAN_BE_DIRTY, "maybe")])).unwrap_err();
    assert!(err.contains(ENV_CAN_BE_DIRTY));

    let err = SchedulerConfig::from_lookup(lookup_from(&[(ENV_BETWEEN_EXECUTIONS_DELAY_MS, "-5")]))
        .unwrap_err();
    assert!(err.contains(ENV_BETWEEN_EXECUTIONS_DELAY_MS));
}
