//! Tests for error types

use prometheus_coalesce::core::{AppResult, ScheduleError};

#[test]
fn test_disposed_error() {
    let err = ScheduleError::Disposed;
    assert_eq!(format!("{}", err), "disposed");
}

#[test]
fn test_cancelled_error() {
    let err = ScheduleError::Cancelled;
    assert_eq!(format!("{}", err), "execution cancelled");
}

#[test]
fn test_action_error() {
    let err = ScheduleError::action(anyhow::anyhow!("429 too many requests"));
    assert_eq!(format!("{}", err), "action failed: 429 too many requests");
}

#[test]
fn test_construction_error() {
    let err = ScheduleError::Construction("no tokio runtime".to_string());
    assert_eq!(format!("{}", err), "construction failed: no tokio runtime");
}

#[test]
fn test_converts_into_app_result() {
    fn refresh() -> AppResult<u32> {
        Err::<(), _>(ScheduleError::Disposed)?;
        Ok(1)
    }
    let err = refresh().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScheduleError>(),
        Some(ScheduleError::Disposed)
    ));
}
