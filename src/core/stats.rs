//! Scheduler statistics counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerStats {
    /// Physical executions started.
    pub runs_started: u64,

    /// Runs whose action returned a value.
    pub runs_succeeded: u64,

    /// Runs whose action returned an error or panicked.
    pub runs_failed: u64,

    /// Runs torn down by disposal.
    pub runs_cancelled: u64,

    /// `execute` calls answered from the cached last result.
    pub cache_hits: u64,

    /// `execute` calls attached to an existing dirty slot or in-flight run.
    pub coalesced_requests: u64,

    /// `forced_execute` calls accepted.
    pub forced_submitted: u64,

    /// Forced requests still waiting in the queue.
    pub forced_queued: u64,
}

/// Internal counters (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub runs_started: AtomicU64,
    pub runs_succeeded: AtomicU64,
    pub runs_failed: AtomicU64,
    pub runs_cancelled: AtomicU64,
    pub cache_hits: AtomicU64,
    pub coalesced_requests: AtomicU64,
    pub forced_submitted: AtomicU64,
}

impl SchedulerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub(crate) fn snapshot(&self, forced_queued: usize) -> SchedulerStats {
        SchedulerStats {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            forced_submitted: self.forced_submitted.load(Ordering::Relaxed),
            forced_queued: forced_queued as u64,
        }
    }
}
