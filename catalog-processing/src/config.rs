use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of worker tasks. Fixed for the lifetime of a run.
    pub pool_size: usize,
    /// Batches that may wait for a worker before submissions are rejected.
    pub queue_capacity: usize,
    /// How long shutdown waits for queued and in-flight batches.
    pub graceful_timeout_ms: u64,
    /// How long shutdown waits for aborted workers to unwind.
    pub force_timeout_ms: u64,
    /// Name of the service identity writes are performed under.
    pub service_subject: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            queue_capacity: 1024,
            graceful_timeout_ms: 60_000,
            force_timeout_ms: 5_000,
            service_subject: "system".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    pub fn force_timeout(&self) -> Duration {
        Duration::from_millis(self.force_timeout_ms)
    }

    pub(crate) fn workers(&self) -> usize {
        self.pool_size.max(1)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
