use catalog_processing::PipelineError;
use catalog_publication::{PublicationError, ReconciliationOutcome};
use catalog_store::StoreError;
use catalog_types::RecordId;
use thiserror::Error;

pub type FrameworkResult<T> = Result<T, FrameworkError>;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Publication(#[from] PublicationError),

    /// The remote operations ran but the new published set could not be
    /// written onto the local record. The outcome says what was done.
    #[error("publication state of record {record_id} not recorded: {source}")]
    PublicationNotRecorded {
        record_id: RecordId,
        outcome: Box<ReconciliationOutcome>,
        #[source]
        source: StoreError,
    },
}
