//! Action execution traits, the per-run execution context and the spawn seam.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Abstraction for spawning background work (worker loops, timer sleepers) on a runtime.
pub trait Spawn {
    /// Spawn a detached future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Per-run view handed to an [`ExecutionAction`].
///
/// Exposes the forced payload (if this run dequeued a forced request), the
/// cancellation scope tied to scheduler disposal, and an output slot the action
/// can use to override the pacing delay before the next run.
pub struct ExecutionContext<P> {
    payload: Option<P>,
    cancellation: CancellationToken,
    override_delay: Arc<Mutex<Option<Duration>>>,
}

impl<P> fmt::Debug for ExecutionContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("forced", &self.payload.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("override_delay", &*self.override_delay.lock())
            .finish()
    }
}

impl<P> ExecutionContext<P> {
    /// Build a context. The returned slot is read back by the scheduler after the run.
    pub(crate) fn new(
        payload: Option<P>,
        cancellation: CancellationToken,
    ) -> (Self, Arc<Mutex<Option<Duration>>>) {
        let override_delay = Arc::new(Mutex::new(None));
        let ctx = Self {
            payload,
            cancellation,
            override_delay: Arc::clone(&override_delay),
        };
        (ctx, override_delay)
    }

    /// Payload of the forced request served by this run, if any.
    pub const fn payload(&self) -> Option<&P> {
        self.payload.as_ref()
    }

    /// Take ownership of the forced payload.
    pub fn take_payload(&mut self) -> Option<P> {
        self.payload.take()
    }

    /// True if this run serves a forced request.
    pub const fn is_forced(&self) -> bool {
        self.payload.is_some()
    }

    /// Cancellation scope, cancelled exactly once when the scheduler is disposed.
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True once the scheduler has been disposed.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the scheduler is disposed.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Replace the between-executions delay applied after this run.
    ///
    /// Typically set from a rate-limit response to push the next run later.
    pub fn set_override_delay(&self, delay: Duration) {
        *self.override_delay.lock() = Some(delay);
    }

    /// Override set so far by this run.
    pub fn override_delay(&self) -> Option<Duration> {
        *self.override_delay.lock()
    }
}

/// The user action a scheduler serializes.
///
/// Closures of the shape `Fn(ExecutionContext<P>) -> impl Future<Output =
/// anyhow::Result<T>>` implement this trait automatically.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_coalesce::core::{ExecutionAction, ExecutionContext};
///
/// struct RefreshToken {
///     client: AuthClient,
/// }
///
/// #[async_trait]
/// impl ExecutionAction<(), Token> for RefreshToken {
///     async fn execute(&self, ctx: ExecutionContext<()>) -> anyhow::Result<Token> {
///         tokio::select! {
///             token = self.client.login() => token,
///             () = ctx.cancelled() => anyhow::bail!("shutting down"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ExecutionAction<P, T>: Send + Sync + 'static
where
    P: Send + 'static,
    T: Send + 'static,
{
    /// Run the action once.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Forced payload, cancellation scope and delay override slot
    ///
    /// # Returns
    ///
    /// The value delivered to every handle coalesced into this run, or the
    /// error they all fail with.
    async fn execute(&self, ctx: ExecutionContext<P>) -> anyhow::Result<T>;
}

#[async_trait]
impl<P, T, F, Fut> ExecutionAction<P, T> for F
where
    P: Send + 'static,
    T: Send + 'static,
    F: Fn(ExecutionContext<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    async fn execute(&self, ctx: ExecutionContext<P>) -> anyhow::Result<T> {
        (self)(ctx).await
    }
}
