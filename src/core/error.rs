//! Error types for scheduler operations.

use std::sync::Arc;

use thiserror::Error;

/// Errors produced by schedulers, timers and execution handles.
///
/// The type is `Clone` because a single run resolves every handle coalesced
/// into it with the same outcome.
#[derive(Debug, Clone, Error)]
pub enum ScheduleError {
    /// The scheduler or timer was disposed before the operation.
    #[error("disposed")]
    Disposed,
    /// The execution was torn down by disposal while it was running.
    #[error("execution cancelled")]
    Cancelled,
    /// The user action returned an error.
    #[error("action failed: {0}")]
    Action(Arc<anyhow::Error>),
    /// The scheduler could not be constructed.
    #[error("construction failed: {0}")]
    Construction(String),
}

impl ScheduleError {
    /// Wrap an action error so it can be shared by every handle of a run.
    pub fn action(err: anyhow::Error) -> Self {
        Self::Action(Arc::new(err))
    }

    /// True for the terminal disposal outcomes (`Disposed` or `Cancelled`).
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed | Self::Cancelled)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
