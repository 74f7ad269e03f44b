//! What happens to writes the store refused.
//!
//! The pipeline never retries a write itself. A failed write is described as
//! a [`FailedWrite`] and handed to the configured [`WriteFailurePolicy`].

use catalog_store::StoreError;
use catalog_types::{OperationKind, Record, RecordId};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::error;

/// Which write call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Content,
    Metadata,
}

impl std::fmt::Display for WriteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Content => write!(f, "content"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}

/// A write the store did not accept.
#[derive(Debug, Clone)]
pub struct FailedWrite {
    pub kind: WriteKind,
    /// Operation of the batch the records came from.
    pub operation: OperationKind,
    /// Records that were not written, as the pipeline tried to write them.
    pub records: Vec<Record>,
    pub reason: String,
    /// Whether the store reported the failure as transient.
    pub transient: bool,
    pub failed_at: DateTime<Utc>,
}

impl FailedWrite {
    pub(crate) fn from_error(
        kind: WriteKind,
        operation: OperationKind,
        records: Vec<Record>,
        err: &StoreError,
    ) -> Self {
        Self {
            kind,
            operation,
            records,
            reason: err.to_string(),
            transient: err.is_transient(),
            failed_at: Utc::now(),
        }
    }

    pub(crate) fn rejected(
        kind: WriteKind,
        operation: OperationKind,
        records: Vec<Record>,
        reason: String,
    ) -> Self {
        Self {
            kind,
            operation,
            records,
            reason,
            transient: false,
            failed_at: Utc::now(),
        }
    }

    pub fn record_ids(&self) -> Vec<&RecordId> {
        self.records.iter().map(|r| &r.id).collect()
    }
}

/// Decides what to do with a failed write.
pub trait WriteFailurePolicy: Send + Sync {
    fn handle(&self, failure: FailedWrite);
}

/// Logs the failure at error level and forgets it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAndDrop;

impl WriteFailurePolicy for LogAndDrop {
    fn handle(&self, failure: FailedWrite) {
        error!(
            kind = %failure.kind,
            operation = %failure.operation,
            records = failure.records.len(),
            transient = failure.transient,
            reason = %failure.reason,
            "Dropping failed post-ingest write"
        );
    }
}

/// Keeps the most recent failed writes in memory for inspection or replay.
///
/// When full, the oldest entry is evicted.
#[derive(Debug)]
pub struct DeadLetterQueue {
    entries: Mutex<VecDeque<FailedWrite>>,
    capacity: usize,
    total_captured: AtomicU64,
    total_dropped: AtomicU64,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            total_captured: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<FailedWrite>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes and returns up to `n` of the oldest entries.
    pub fn drain(&self, n: usize) -> Vec<FailedWrite> {
        let mut entries = self.entries();
        let count = n.min(entries.len());
        entries.drain(..count).collect()
    }

    pub fn peek(&self, n: usize) -> Vec<FailedWrite> {
        self.entries().iter().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_captured(&self) -> u64 {
        self.total_captured.load(Ordering::Relaxed)
    }

    /// Entries evicted to make room.
    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }
}

impl WriteFailurePolicy for DeadLetterQueue {
    fn handle(&self, failure: FailedWrite) {
        let mut entries = self.entries();
        if entries.len() >= self.capacity {
            entries.pop_front();
            self.total_dropped.fetch_add(1, Ordering::Relaxed);
        }
        entries.push_back(failure);
        self.total_captured.fetch_add(1, Ordering::Relaxed);
    }
}
