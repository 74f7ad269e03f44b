//! Error types for the processing pipeline.

use thiserror::Error;

/// Result type for plugin calls.
pub type ProcessingResult<T> = Result<T, ProcessingError>;

/// Result type for pipeline lifecycle and submission.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// A non-fatal error raised by a plugin. The pipeline logs it and moves on
/// to the next plugin.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("plugin rejected the batch: {0}")]
    Rejected(String),

    #[error("resource error: {0}")]
    Resource(#[from] catalog_types::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("pipeline is not running")]
    NotRunning,

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("submission queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("no async runtime available to run pipeline workers")]
    NoRuntime,
}
