//! Rearm-able single-fire deadline timer.
//!
//! A [`DeadlineTimer`] owns one completion per *cycle*. A cycle starts idle,
//! becomes armed by [`set_delay`](DeadlineTimer::set_delay) or
//! [`set_target_time`](DeadlineTimer::set_target_time), and resolves exactly
//! once when the armed instant passes. A fired cycle stays resolved until
//! [`reset`](DeadlineTimer::reset) starts the next one.
//!
//! While armed, the [`RearmPolicy`] decides whether a new request moves the
//! target:
//!
//! - [`RearmPolicy::Exact`] always moves it
//! - [`RearmPolicy::ShortestWins`] only pulls it earlier
//! - [`RearmPolicy::LongestWins`] only pushes it later (debounce)
//!
//! Each arm spawns one sleeper through the timer's [`Spawn`] implementation.
//! Rearming cancels the previous sleeper, and a sleeper only fires the cycle
//! if its generation is still current.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::core::{ScheduleError, Spawn};
use crate::runtime::TokioSpawner;

/// Broadcast capacity for elapsed notifications.
const ELAPSED_CHANNEL_CAPACITY: usize = 16;

/// Used when `now + delay` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Decides whether a new arm request replaces the currently armed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RearmPolicy {
    /// Every request replaces the current target.
    #[default]
    Exact,
    /// A request only replaces the target if it fires earlier.
    ShortestWins,
    /// A request only replaces the target if it fires later.
    LongestWins,
}

impl RearmPolicy {
    /// True if `requested` should replace the armed `current` target.
    pub fn should_rearm(self, current: Instant, requested: Instant) -> bool {
        match self {
            Self::Exact => true,
            Self::ShortestWins => requested < current,
            Self::LongestWins => requested > current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed(Instant),
    Fired,
}

#[derive(Debug, Clone, Copy, Default)]
struct CycleStatus {
    cycle: u64,
    fired: bool,
    disposed: bool,
}

struct TimerState {
    phase: Phase,
    generation: u64,
    sleeper: Option<CancellationToken>,
    disposed: bool,
}

struct TimerInner {
    policy: RearmPolicy,
    state: Mutex<TimerState>,
    cycle: watch::Sender<CycleStatus>,
    elapsed_tx: broadcast::Sender<Instant>,
}

impl TimerInner {
    fn fire(&self, state: &mut TimerState) {
        state.phase = Phase::Fired;
        state.sleeper = None;
        self.cycle.send_modify(|status| status.fired = true);
        // No subscribers is fine.
        let _ = self.elapsed_tx.send(Instant::now());
        trace!(generation = state.generation, "deadline timer fired");
    }

    fn fire_if_current(&self, generation: u64) {
        let mut state = self.state.lock();
        if !state.disposed
            && state.generation == generation
            && matches!(state.phase, Phase::Armed(_))
        {
            self.fire(&mut state);
        }
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(sleeper) = state.sleeper.take() {
            sleeper.cancel();
        }
        if matches!(state.phase, Phase::Armed(_)) {
            state.phase = Phase::Idle;
        }
        self.cycle.send_modify(|status| status.disposed = true);
        debug!("deadline timer disposed");
    }
}

/// Rearm-able single-fire delayed completion.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_coalesce::core::{DeadlineTimer, RearmPolicy};
///
/// // Debounce: keep extending while requests keep coming.
/// let timer = DeadlineTimer::with_policy(RearmPolicy::LongestWins)?;
/// timer.set_delay(Duration::from_millis(200))?;
/// timer.set_delay(Duration::from_millis(400))?;
/// timer.elapsed().await?; // fires at +400ms
/// ```
pub struct DeadlineTimer<S = TokioSpawner> {
    inner: Arc<TimerInner>,
    spawner: S,
}

impl<S> fmt::Debug for DeadlineTimer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("DeadlineTimer")
            .field("policy", &self.inner.policy)
            .field("phase", &state.phase)
            .field("disposed", &state.disposed)
            .finish_non_exhaustive()
    }
}

impl DeadlineTimer<TokioSpawner> {
    /// Create an idle timer on the ambient Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Construction`] when called outside a Tokio runtime.
    pub fn with_policy(policy: RearmPolicy) -> Result<Self, ScheduleError> {
        Ok(Self::new(policy, TokioSpawner::current()?))
    }
}

impl<S: Spawn> DeadlineTimer<S> {
    /// Create an idle timer whose sleepers run on `spawner`.
    pub fn new(policy: RearmPolicy, spawner: S) -> Self {
        let (cycle, _rx) = watch::channel(CycleStatus::default());
        let (elapsed_tx, _) = broadcast::channel(ELAPSED_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(TimerInner {
                policy,
                state: Mutex::new(TimerState {
                    phase: Phase::Idle,
                    generation: 0,
                    sleeper: None,
                    disposed: false,
                }),
                cycle,
                elapsed_tx,
            }),
            spawner,
        }
    }

    /// Rearm policy of this timer.
    pub fn policy(&self) -> RearmPolicy {
        self.inner.policy
    }

    /// Arm the timer to fire `delay` from now. A zero delay fires immediately.
    ///
    /// Has no effect on a fired cycle, and on an armed one only if the policy
    /// accepts the new target.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after [`dispose`](Self::dispose).
    pub fn set_delay(&self, delay: Duration) -> Result<(), ScheduleError> {
        let now = Instant::now();
        let target = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.arm(target, now)
    }

    /// Arm the timer to fire at `target`. Instants in the past fire immediately.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after [`dispose`](Self::dispose).
    pub fn set_target_time(&self, target: Instant) -> Result<(), ScheduleError> {
        self.arm(target, Instant::now())
    }

    fn arm(&self, target: Instant, now: Instant) -> Result<(), ScheduleError> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(ScheduleError::Disposed);
        }
        match state.phase {
            Phase::Fired => return Ok(()),
            Phase::Armed(current) if !self.inner.policy.should_rearm(current, target) => {
                return Ok(());
            }
            Phase::Armed(_) | Phase::Idle => {}
        }

        if let Some(sleeper) = state.sleeper.take() {
            sleeper.cancel();
        }
        state.generation = state.generation.wrapping_add(1);

        if target <= now {
            self.inner.fire(&mut state);
            return Ok(());
        }

        state.phase = Phase::Armed(target);
        let token = CancellationToken::new();
        state.sleeper = Some(token.clone());
        let generation = state.generation;
        drop(state);

        trace!(
            generation,
            delay_ms = target.saturating_duration_since(now).as_millis(),
            "deadline timer armed"
        );

        let inner: Weak<TimerInner> = Arc::downgrade(&self.inner);
        self.spawner.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep_until(target) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.fire_if_current(generation);
                    }
                }
            }
        });
        Ok(())
    }
}

impl<S> DeadlineTimer<S> {
    /// Start a fresh unresolved cycle if the current one fired. No effect while
    /// idle or armed.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::Disposed`] after [`dispose`](Self::dispose).
    pub fn reset(&self) -> Result<(), ScheduleError> {
        let mut state = self.inner.state.lock();
        if state.disposed {
            return Err(ScheduleError::Disposed);
        }
        if state.phase == Phase::Fired {
            state.phase = Phase::Idle;
            self.inner.cycle.send_modify(|status| {
                status.cycle = status.cycle.wrapping_add(1);
                status.fired = false;
            });
        }
        Ok(())
    }

    /// Resolves when the current cycle fires.
    ///
    /// The cycle is captured when this method is called; a later
    /// [`reset`](Self::reset) does not affect an already created future.
    /// Resolves with [`ScheduleError::Disposed`] if the timer is disposed
    /// before the cycle fires.
    pub fn elapsed(&self) -> impl Future<Output = Result<(), ScheduleError>> + Send + 'static {
        let mut rx = self.inner.cycle.subscribe();
        let cycle = rx.borrow().cycle;
        async move {
            let status = match rx
                .wait_for(|status| status.cycle != cycle || status.fired || status.disposed)
                .await
            {
                Ok(status) => *status,
                Err(_) => return Err(ScheduleError::Disposed),
            };
            if status.fired || status.cycle != cycle {
                Ok(())
            } else {
                Err(ScheduleError::Disposed)
            }
        }
    }

    /// Receive one message (the fire instant) every time the timer fires.
    pub fn subscribe(&self) -> broadcast::Receiver<Instant> {
        self.inner.elapsed_tx.subscribe()
    }

    /// True while a target is armed and has not fired yet.
    pub fn is_armed(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Armed(_))
    }

    /// True if the current cycle has fired.
    pub fn has_fired(&self) -> bool {
        self.inner.state.lock().phase == Phase::Fired
    }

    /// The armed target, if any.
    pub fn target(&self) -> Option<Instant> {
        match self.inner.state.lock().phase {
            Phase::Armed(target) => Some(target),
            Phase::Idle | Phase::Fired => None,
        }
    }

    /// True after [`dispose`](Self::dispose).
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Make the timer permanently non-rearmable. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl<S> Drop for DeadlineTimer<S> {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}
