//! Error types for publication reconciliation.

use catalog_store::StoreError;
use catalog_types::RecordId;
use thiserror::Error;

/// Result type for reconciliation operations.
pub type PublicationResult<T> = Result<T, PublicationError>;

/// Errors that abort a reconciliation as a whole.
///
/// Per-destination failures never surface here; they are collected in the
/// outcome.
#[derive(Debug, Error)]
pub enum PublicationError {
    /// The local store could not be queried, so the current publication
    /// state is unknown.
    #[error("cannot read publication state of record {record_id}: {source}")]
    StateQuery {
        record_id: RecordId,
        #[source]
        source: StoreError,
    },

    /// The operation needs the local record and it does not exist.
    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}
