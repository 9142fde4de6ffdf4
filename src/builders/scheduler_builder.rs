//! Build coalescing schedulers from configuration.

use crate::config::SchedulerConfig;
use crate::core::{CoalescingScheduler, ExecutionAction, ScheduleError, Spawn};

/// Build a scheduler from a validated configuration on the given spawner.
pub fn build_scheduler<T, P, A, S>(
    cfg: &SchedulerConfig,
    action: A,
    spawner: S,
) -> Result<CoalescingScheduler<T, P, S>, ScheduleError>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    A: ExecutionAction<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    cfg.validate()
        .map_err(|e| ScheduleError::Construction(format!("config invalid: {e}")))?;
    CoalescingScheduler::with_spawner(action, cfg.clone(), spawner)
}

/// Parse a JSON configuration and build a scheduler on the given spawner.
pub fn build_scheduler_from_json<T, P, A, S>(
    input: &str,
    action: A,
    spawner: S,
) -> Result<CoalescingScheduler<T, P, S>, ScheduleError>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    A: ExecutionAction<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let cfg = SchedulerConfig::from_json_str(input)
        .map_err(|e| ScheduleError::Construction(format!("config invalid: {e}")))?;
    build_scheduler(&cfg, action, spawner)
}

/// Load configuration from the environment (and `.env`) and build a scheduler.
pub fn build_scheduler_from_env<T, P, A, S>(
    action: A,
    spawner: S,
) -> Result<CoalescingScheduler<T, P, S>, ScheduleError>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    A: ExecutionAction<P, T>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let cfg = SchedulerConfig::from_env()
        .map_err(|e| ScheduleError::Construction(format!("config invalid: {e}")))?;
    tracing::debug!(?cfg, "scheduler config loaded from environment");
    build_scheduler(&cfg, action, spawner)
}
