//! Tests for builder modules

use prometheus_coalesce::builders::{build_scheduler, build_scheduler_from_json};
use prometheus_coalesce::config::SchedulerConfig;
use prometheus_coalesce::core::{CoalescingScheduler, ExecutionContext, ScheduleError};
use prometheus_coalesce::runtime::TokioSpawner;
use std::time::Duration;

fn echo_action(ctx: ExecutionContext<String>) -> impl std::future::Future<Output = anyhow::Result<String>> {
    async move { Ok(ctx.payload().cloned().unwrap_or_else(|| "refresh".to_string())) }
}

#[tokio::test]
async fn test_build_scheduler_applies_config() {
    let cfg = SchedulerConfig::default()
        .with_between_executions_delay_ms(250)
        .with_can_be_dirty(false);
    let scheduler: CoalescingScheduler<String, String> =
        build_scheduler(&cfg, echo_action, TokioSpawner::current().unwrap()).unwrap();

    assert_eq!(scheduler.between_executions_delay(), Duration::from_millis(250));
    assert!(!scheduler.can_be_dirty());
    assert_eq!(
        scheduler.forced_execute("edit".to_string()).unwrap().await.unwrap(),
        "edit"
    );
}

#[tokio::test]
async fn test_build_scheduler_from_json() {
    let scheduler: CoalescingScheduler<String, String> = build_scheduler_from_json(
        r#"{ "should_execute_non_dirty_if_nothing_running": true }"#,
        echo_action,
        TokioSpawner::current().unwrap(),
    )
    .unwrap();

    assert!(scheduler.should_execute_non_dirty_if_nothing_running());
    assert_eq!(scheduler.execute(true).unwrap().await.unwrap(), "refresh");
}

#[tokio::test]
async fn test_build_scheduler_rejects_invalid_config() {
    let result: Result<CoalescingScheduler<String, String>, _> = build_scheduler_from_json(
        r#"{ "between_executions_delay_ms": 999999999999 }"#,
        echo_action,
        TokioSpawner::current().unwrap(),
    );
    assert!(matches!(result, Err(ScheduleError::Construction(_))));
}
