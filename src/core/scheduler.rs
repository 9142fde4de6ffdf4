//! Coalescing single-flight scheduler.
//!
//! One [`CoalescingScheduler`] serializes one user action across any number of
//! callers:
//!
//! - at most one run is in flight
//! - at most one *dirty* rerun is queued behind it; further dirty requests
//!   attach to that same slot
//! - forced requests carry a payload, queue FIFO and are never merged with
//!   each other, though a forced request and the dirty slot can share a run
//! - non-forced runs are paced by a between-executions delay enforced through
//!   a shortest-wins [`DeadlineTimer`]
//!
//! Bookkeeping lives behind one `parking_lot::Mutex` that is never held
//! across the action.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, Instrument};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::core::handle::{Completion, Outcome};
use crate::core::stats::SchedulerCounters;
use crate::core::{
    DeadlineTimer, ExecutionAction, ExecutionContext, ExecutionHandle, RearmPolicy, ScheduleError,
    SchedulerStats, Spawn,
};
use crate::runtime::TokioSpawner;

/// Outermost type names that are themselves asynchronous handles and still
/// satisfy the `Clone + Send + Sync` result bound.
///
/// `std::any::type_name` output is best-effort and may change between
/// compiler releases, so a miss here only loses the check.
const ASYNC_HANDLE_TYPE_PREFIXES: &[&str] = &[
    "futures_util::future::future::shared::Shared<",
    "tokio::sync::watch::Receiver<",
    "core::pin::Pin<",
    "alloc::sync::Arc<dyn core::future::future::Future",
];

/// Reject result types that are themselves futures or future-like handles.
///
/// Most such types (join handles, boxed futures, [`ExecutionHandle`]) are
/// already excluded at compile time by the `Clone` bound on results; this
/// catches the cloneable leftovers by name and cannot see through wrappers.
fn ensure_not_async_handle<T>() -> Result<(), ScheduleError> {
    let name = std::any::type_name::<T>();
    if ASYNC_HANDLE_TYPE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        return Err(ScheduleError::Construction(format!(
            "result type `{name}` is an asynchronous handle; await it inside the action"
        )));
    }
    Ok(())
}

struct ForcedEntry<T, P> {
    completion: Completion<T>,
    payload: P,
}

struct State<T, P> {
    between_executions_delay: Duration,
    can_be_dirty: bool,
    execute_non_dirty_if_idle: bool,
    /// Completions of the run in flight; the first one is the pending execution.
    running: Vec<Completion<T>>,
    dirty: Option<Completion<T>>,
    forced: VecDeque<ForcedEntry<T, P>>,
    last_result: Option<T>,
    /// Earliest pacing target requested while a run was in flight.
    pending_target: Option<Instant>,
    disposed: bool,
}

impl<T, P> State<T, P> {
    fn open_dirty_slot(&mut self, signal: &Notify) -> ExecutionHandle<T> {
        let completion = Completion::new();
        let handle = completion.handle();
        self.dirty = Some(completion);
        signal.notify_one();
        handle
    }

    fn request_target(&mut self, target: Instant) {
        self.pending_target = Some(
            self.pending_target
                .map_or(target, |pending| pending.min(target)),
        );
    }
}

/// Start the next pacing cycle after a run. The timer is shortest-wins, so a
/// target requested during the run only applies if it is earlier.
fn rearm_pacing<S: Spawn>(
    timer: &DeadlineTimer<S>,
    delay: Duration,
    pending_target: Option<Instant>,
) -> Result<(), ScheduleError> {
    timer.reset()?;
    timer.set_delay(delay)?;
    if let Some(target) = pending_target {
        timer.set_target_time(target)?;
    }
    Ok(())
}

struct Shared<T, P, S> {
    id: Uuid,
    state: Mutex<State<T, P>>,
    signal: Notify,
    timer: DeadlineTimer<S>,
    shutdown: CancellationToken,
    counters: SchedulerCounters,
}

impl<T, P, S> Shared<T, P, S> {
    fn dispose(&self) {
        let (running, dirty, forced) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (
                mem::take(&mut state.running),
                state.dirty.take(),
                mem::take(&mut state.forced),
            )
        };

        self.shutdown.cancel();
        self.timer.dispose();

        for completion in &running {
            completion.resolve(Err(ScheduleError::Cancelled));
        }
        if let Some(completion) = dirty {
            completion.resolve(Err(ScheduleError::Disposed));
        }
        for entry in forced {
            entry.completion.resolve(Err(ScheduleError::Disposed));
        }
        debug!(id = %self.id, "scheduler disposed");
    }
}

/// Coalescing single-flight execution scheduler.
///
/// The worker loop starts at construction and runs until [`dispose`](Self::dispose)
/// or until the scheduler is dropped. Share it between callers with an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_coalesce::config::SchedulerConfig;
/// use prometheus_coalesce::core::{CoalescingScheduler, ExecutionContext};
///
/// // Credential refresher: every call is a fresh retry, naturally throttled.
/// let refresher = CoalescingScheduler::new(
///     move |_ctx: ExecutionContext<()>| login(client.clone()),
///     SchedulerConfig::default()
///         .with_can_be_dirty(false)
///         .with_between_executions_delay_ms(5 * 60 * 1000),
/// )?;
///
/// let token = refresher.execute(false)?.await?;
/// ```
pub struct CoalescingScheduler<T, P = (), S = TokioSpawner> {
    shared: Arc<Shared<T, P, S>>,
}

impl<T, P, S> fmt::Debug for CoalescingScheduler<T, P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("CoalescingScheduler")
            .field("id", &self.shared.id)
            .field("executing", &!state.running.is_empty())
            .field("dirty", &state.dirty.is_some())
            .field("forced_queued", &state.forced.len())
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

impl<T, P> CoalescingScheduler<T, P, TokioSpawner>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    /// Create a scheduler on the ambient Tokio runtime and start its worker loop.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Construction`] if there is no Tokio runtime, the
    /// configuration is invalid, or `T` is itself an asynchronous handle.
    pub fn new<A>(action: A, config: SchedulerConfig) -> Result<Self, ScheduleError>
    where
        A: ExecutionAction<P, T>,
    {
        Self::with_spawner(action, config, TokioSpawner::current()?)
    }
}

impl<T, P, S> CoalescingScheduler<T, P, S>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler whose worker loop and pacing timer run on `spawner`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Construction`] if the configuration is invalid or `T`
    /// is itself an asynchronous handle.
    pub fn with_spawner<A>(
        action: A,
        config: SchedulerConfig,
        spawner: S,
    ) -> Result<Self, ScheduleError>
    where
        A: ExecutionAction<P, T>,
    {
        ensure_not_async_handle::<T>()?;
        config.validate().map_err(ScheduleError::Construction)?;

        let timer = DeadlineTimer::new(RearmPolicy::ShortestWins, spawner.clone());
        // The first run is not paced.
        timer.set_delay(Duration::ZERO)?;

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            state: Mutex::new(State {
                between_executions_delay: config.between_executions_delay(),
                can_be_dirty: config.can_be_dirty,
                execute_non_dirty_if_idle: config.should_execute_non_dirty_if_nothing_running,
                running: Vec::new(),
                dirty: None,
                forced: VecDeque::new(),
                last_result: None,
                pending_target: None,
                disposed: false,
            }),
            signal: Notify::new(),
            timer,
            shutdown: CancellationToken::new(),
            counters: SchedulerCounters::default(),
        });

        let id = shared.id;
        spawner.spawn(
            worker_loop(Arc::clone(&shared), action)
                .instrument(tracing::debug_span!("coalescing_scheduler", %id)),
        );
        debug!(%id, ?config, "scheduler started");

        Ok(Self { shared })
    }

    /// Request a run. Shorthand for [`execute_with_delay`](Self::execute_with_delay)
    /// without a delay override.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after disposal.
    pub fn execute(&self, makes_dirty: bool) -> Result<ExecutionHandle<T>, ScheduleError> {
        self.execute_with_delay(makes_dirty, None)
    }

    /// Request a run.
    ///
    /// With `dirty = makes_dirty || !can_be_dirty`:
    ///
    /// 1. a queued dirty slot is reused as is;
    /// 2. with nothing running, a non-dirty request returns the cached result
    ///    (unless `should_execute_non_dirty_if_nothing_running`), otherwise a
    ///    dirty slot is opened;
    /// 3. with a run in flight, a non-dirty request attaches to it and a dirty
    ///    one opens a dirty slot.
    ///
    /// `delay_override` is applied to the shortest-wins pacing timer, so it can
    /// only bring the next run forward. An override issued while a run is in
    /// flight applies to the pacing cycle that starts when that run finishes.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after disposal.
    pub fn execute_with_delay(
        &self,
        makes_dirty: bool,
        delay_override: Option<Duration>,
    ) -> Result<ExecutionHandle<T>, ScheduleError> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.disposed {
            return Err(ScheduleError::Disposed);
        }
        let handle = {
            let dirty = makes_dirty || !state.can_be_dirty;
            let existing = state.dirty.as_ref().map(Completion::handle);
            let current = state.running.first().cloned();

            if let Some(handle) = existing {
                SchedulerCounters::bump(&shared.counters.coalesced_requests);
                handle
            } else if let Some(current) = current {
                if dirty {
                    state.open_dirty_slot(&shared.signal)
                } else {
                    SchedulerCounters::bump(&shared.counters.coalesced_requests);
                    current.handle()
                }
            } else {
                let cached = if dirty || state.execute_non_dirty_if_idle {
                    None
                } else {
                    state.last_result.clone()
                };
                match cached {
                    Some(value) => {
                        SchedulerCounters::bump(&shared.counters.cache_hits);
                        Completion::resolved(Ok(value)).handle()
                    }
                    None => state.open_dirty_slot(&shared.signal),
                }
            }
        };

        // The worker rearms the timer under the state lock, so an empty
        // `running` here means the current cycle already accounts for the last run.
        if let Some(target) = delay_override.and_then(|delay| Instant::now().checked_add(delay)) {
            if state.running.is_empty() {
                shared.timer.set_target_time(target)?;
            } else {
                state.request_target(target);
            }
        }
        Ok(handle)
    }

    /// Queue a forced run carrying `payload`.
    ///
    /// Forced runs bypass the pacing delay, drain in submission order one per
    /// run, and are never merged with each other.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after disposal.
    pub fn forced_execute(&self, payload: P) -> Result<ExecutionHandle<T>, ScheduleError> {
        let shared = &self.shared;
        let handle = {
            let mut state = shared.state.lock();
            if state.disposed {
                return Err(ScheduleError::Disposed);
            }
            let completion = Completion::new();
            let handle = completion.handle();
            state.forced.push_back(ForcedEntry {
                completion,
                payload,
            });
            handle
        };

        SchedulerCounters::bump(&shared.counters.forced_submitted);
        shared.signal.notify_one();
        shared.timer.set_delay(Duration::ZERO)?;
        Ok(handle)
    }
}

impl<T, P, S> CoalescingScheduler<T, P, S>
where
    T: Clone + Send + Sync + 'static,
{
    /// Completes when the run in flight (if any) completes, whatever its outcome.
    pub fn wait_for_current(&self) -> impl Future<Output = ()> + Send + 'static {
        let handle = self
            .shared
            .state
            .lock()
            .running
            .first()
            .map(Completion::handle);
        async move {
            if let Some(handle) = handle {
                let _ = handle.wait().await;
            }
        }
    }

    /// Most recent successful result.
    pub fn last_result(&self) -> Option<T> {
        self.shared.state.lock().last_result.clone()
    }
}

impl<T, P, S> CoalescingScheduler<T, P, S> {
    /// True while a run is in flight. Always false after disposal.
    pub fn is_executing(&self) -> bool {
        let state = self.shared.state.lock();
        !state.disposed && !state.running.is_empty()
    }

    /// True after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Identifier used in this scheduler's tracing span.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Minimum delay after a run before the next non-forced run.
    pub fn between_executions_delay(&self) -> Duration {
        self.shared.state.lock().between_executions_delay
    }

    /// Change the pacing delay. Takes effect when the next run finishes.
    pub fn set_between_executions_delay(&self, delay: Duration) {
        self.shared.state.lock().between_executions_delay = delay;
    }

    /// Whether non-dirty requests may be answered from the cache.
    pub fn can_be_dirty(&self) -> bool {
        self.shared.state.lock().can_be_dirty
    }

    /// When false, every `execute` call is treated as dirty.
    pub fn set_can_be_dirty(&self, can_be_dirty: bool) {
        self.shared.state.lock().can_be_dirty = can_be_dirty;
    }

    /// Whether a non-dirty request on an idle scheduler starts a fresh run.
    pub fn should_execute_non_dirty_if_nothing_running(&self) -> bool {
        self.shared.state.lock().execute_non_dirty_if_idle
    }

    /// When true, a non-dirty request on an idle scheduler starts a fresh run
    /// instead of returning the cached result.
    pub fn set_should_execute_non_dirty_if_nothing_running(&self, enabled: bool) {
        self.shared.state.lock().execute_non_dirty_if_idle = enabled;
    }

    /// Snapshot of activity counters.
    pub fn stats(&self) -> SchedulerStats {
        let forced_queued = self.shared.state.lock().forced.len();
        self.shared.counters.snapshot(forced_queued)
    }

    /// Stop the scheduler. Idempotent.
    ///
    /// Cancels the token seen by the running action, resolves the running
    /// run's handles with [`ScheduleError::Cancelled`] and every queued
    /// request with [`ScheduleError::Disposed`]. Later calls fail with
    /// [`ScheduleError::Disposed`].
    pub fn dispose(&self) {
        self.shared.dispose();
    }
}

impl<T, P, S> Drop for CoalescingScheduler<T, P, S> {
    fn drop(&mut self) {
        self.shared.dispose();
    }
}

async fn worker_loop<T, P, S, A>(shared: Arc<Shared<T, P, S>>, action: A)
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
    S: Spawn + Send + Sync + 'static,
    A: ExecutionAction<P, T>,
{
    debug!("worker loop started");
    loop {
        let (has_dirty, has_forced) = {
            let state = shared.state.lock();
            if state.disposed {
                break;
            }
            (state.dirty.is_some(), !state.forced.is_empty())
        };

        if !has_dirty && !has_forced {
            tokio::select! {
                () = shared.signal.notified() => continue,
                () = shared.shutdown.cancelled() => break,
            }
        }

        // Pacing applies to dirty-only work.
        if !has_forced {
            let elapsed = shared.timer.elapsed();
            tokio::select! {
                result = elapsed => {
                    if result.is_err() {
                        break;
                    }
                }
                () = shared.shutdown.cancelled() => break,
            }
        }

        let (targets, payload) = {
            let mut state = shared.state.lock();
            if state.disposed {
                break;
            }
            let forced = state.forced.pop_front();
            let dirty = state.dirty.take();
            if dirty.is_none() && forced.is_none() {
                continue;
            }
            let mut targets = Vec::with_capacity(2);
            targets.extend(dirty);
            let payload = forced.map(|entry| {
                targets.push(entry.completion);
                entry.payload
            });
            state.running.clone_from(&targets);
            (targets, payload)
        };

        SchedulerCounters::bump(&shared.counters.runs_started);
        let (ctx, override_slot) = ExecutionContext::new(payload, shared.shutdown.child_token());
        trace!(forced = ctx.is_forced(), coalesced = targets.len(), "run started");

        let result = AssertUnwindSafe(action.execute(ctx)).catch_unwind().await;
        let cancelled = shared.shutdown.is_cancelled();
        let outcome: Outcome<T> = match result {
            _ if cancelled => Err(ScheduleError::Cancelled),
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ScheduleError::action(err)),
            Err(_) => Err(ScheduleError::action(anyhow::anyhow!("action panicked"))),
        };

        let override_delay = *override_slot.lock();
        // Rearm pacing before waking callers so their follow-up requests see it.
        let (delay, stopped) = {
            let mut state = shared.state.lock();
            state.running.clear();
            if let Ok(value) = &outcome {
                state.last_result = Some(value.clone());
            }
            let delay = override_delay.unwrap_or(state.between_executions_delay);
            let pending_target = state.pending_target.take();
            let stopped =
                cancelled || rearm_pacing(&shared.timer, delay, pending_target).is_err();
            (delay, stopped)
        };

        let counter = match &outcome {
            Ok(_) => &shared.counters.runs_succeeded,
            Err(ScheduleError::Cancelled) => &shared.counters.runs_cancelled,
            Err(_) => &shared.counters.runs_failed,
        };
        SchedulerCounters::bump(counter);
        trace!(ok = outcome.is_ok(), next_delay_ms = delay.as_millis(), "run finished");

        for completion in &targets {
            completion.resolve(outcome.clone());
        }

        if stopped {
            break;
        }
    }
    debug!("worker loop stopped");
}
