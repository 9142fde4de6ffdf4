//! Core scheduling abstractions: scheduler, deadline timer, handles and errors.

pub mod error;
pub mod executor;
pub mod handle;
pub mod scheduler;
pub mod stats;
pub mod timer;

pub use error::{AppResult, ScheduleError};
pub use executor::{ExecutionAction, ExecutionContext, Spawn};
pub use handle::ExecutionHandle;
pub use scheduler::CoalescingScheduler;
pub use stats::SchedulerStats;
pub use timer::{DeadlineTimer, RearmPolicy};
