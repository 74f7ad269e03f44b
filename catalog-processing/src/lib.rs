//! Post-ingest processing pipeline.
//!
//! Every create, update and delete that passes through the catalog is handed,
//! after the fact, to a [`Pipeline`]. A fixed pool of workers threads each
//! [`ProcessBatch`](catalog_types::ProcessBatch) through an ordered chain of
//! [`Plugin`]s and then writes back whatever actually changed.
//!
//! # Guarantees
//!
//! - **Resilient chain**: a failing or panicking plugin is logged and skipped;
//!   the next plugin sees the batch as it was before the failure
//! - **No redundant writes**: only items whose record or content was modified
//!   are persisted
//! - **Resource cleanup**: every resource seen during a run is closed exactly
//!   once when the run ends
//! - **Service identity**: writes run under the pipeline's service
//!   [`Subject`](catalog_store::Subject)
//! - **Bounded shutdown**: draining waits at most the graceful timeout, then
//!   the force timeout
//!
//! Submission never blocks. A full queue rejects the batch with
//! [`PipelineError::QueueFull`].

mod config;
mod error;
mod hook;
mod pipeline;
mod plugin;
mod policy;
mod stats;
mod worker;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, ProcessingError, ProcessingResult};
pub use hook::{PostIngestHook, ResourceResolver};
pub use pipeline::{Pipeline, PipelineState, ShutdownOutcome, Submission};
pub use plugin::{Plugin, PluginOutcome};
pub use policy::{DeadLetterQueue, FailedWrite, LogAndDrop, WriteFailurePolicy, WriteKind};
pub use stats::PipelineStats;
