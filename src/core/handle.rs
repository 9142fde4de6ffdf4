//! Completion sources and the caller-facing execution handle.
//!
//! A [`Completion`] is the resolve side of one logical request. It is resolved
//! at most once; later resolutions are ignored. Every caller coalesced into the
//! same request gets its own [`ExecutionHandle`] subscribed to that completion.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::core::ScheduleError;

/// Outcome shared by every handle of a run.
pub(crate) type Outcome<T> = Result<T, ScheduleError>;

/// Resolve side of a logical request.
pub(crate) struct Completion<T> {
    tx: Arc<watch::Sender<Option<Outcome<T>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Completion<T> {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// A completion that is already resolved, used for cache hits.
    pub(crate) fn resolved(outcome: Outcome<T>) -> Self {
        let (tx, _rx) = watch::channel(Some(outcome));
        Self { tx: Arc::new(tx) }
    }

    /// Resolve with `outcome` unless already resolved. Returns true if this
    /// call resolved it.
    pub(crate) fn resolve(&self, outcome: Outcome<T>) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub(crate) fn handle(&self) -> ExecutionHandle<T> {
        ExecutionHandle {
            rx: self.tx.subscribe(),
        }
    }
}

/// Caller-facing handle to the outcome of a scheduled execution.
///
/// Await it directly (`handle.await`) or call [`wait`](Self::wait). If the
/// scheduler is dropped without ever resolving the request the handle yields
/// [`ScheduleError::Cancelled`].
pub struct ExecutionHandle<T> {
    rx: watch::Receiver<Option<Outcome<T>>>,
}

impl<T> fmt::Debug for ExecutionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("finished", &self.rx.borrow().is_some())
            .finish()
    }
}

impl<T: Clone> ExecutionHandle<T> {
    /// True once the outcome is available.
    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The outcome if it is already available, without waiting.
    pub fn try_result(&self) -> Option<Result<T, ScheduleError>> {
        self.rx.borrow().clone()
    }

    /// Wait for the outcome.
    pub async fn wait(mut self) -> Result<T, ScheduleError> {
        match self.rx.wait_for(Option::is_some).await {
            Ok(slot) => slot.clone().unwrap_or(Err(ScheduleError::Cancelled)),
            Err(_) => Err(ScheduleError::Cancelled),
        }
    }
}

impl<T> IntoFuture for ExecutionHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ScheduleError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_only_once() {
        let completion = Completion::<u32>::new();
        let handle = completion.handle();
        assert!(!handle.is_finished());

        assert!(completion.resolve(Ok(1)));
        assert!(!completion.resolve(Ok(2)));
        assert!(completion.is_resolved());

        assert_eq!(handle.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_every_handle_sees_the_same_outcome() {
        let completion = Completion::<String>::new();
        let handles: Vec<_> = (0..4).map(|_| completion.handle()).collect();

        completion.resolve(Ok("done".to_string()));

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "done");
        }
    }

    #[tokio::test]
    async fn test_dropped_completion_cancels_handle() {
        let completion = Completion::<u32>::new();
        let handle = completion.handle();
        drop(completion);

        assert!(matches!(handle.await, Err(ScheduleError::Cancelled)));
    }

    #[test]
    fn test_resolved_completion_is_immediately_available() {
        let completion = Completion::resolved(Ok(7_u8));
        let handle = completion.handle();
        assert!(handle.is_finished());
        assert_eq!(handle.try_result().unwrap().unwrap(), 7);
    }
}
