use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of pipeline activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Batches accepted onto the queue.
    pub submitted: u64,
    /// Batches dropped because the plugin chain is empty.
    pub skipped: u64,
    /// Batches refused because the queue was full.
    pub rejected: u64,
    /// Batches a worker ran to the end.
    pub completed: u64,
    /// Plugin calls that returned an error or panicked.
    pub plugin_failures: u64,
    /// Write calls handed to the failure policy.
    pub failed_writes: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub submitted: AtomicU64,
    pub skipped: AtomicU64,
    pub rejected: AtomicU64,
    pub completed: AtomicU64,
    pub plugin_failures: AtomicU64,
    pub failed_writes: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            plugin_failures: self.plugin_failures.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
        }
    }
}
