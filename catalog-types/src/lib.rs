//! Core type definitions for the federated catalog.
//!
//! This crate defines the plugin-agnostic types shared by every other crate
//! in the workspace:
//! - Record and destination identifiers
//! - [`Record`], the attributed unit of catalog data, and its typed values
//! - [`ProcessItem`] / [`ProcessBatch`], the units handed to post-ingest plugins
//! - [`ProcessResource`], a named byte stream attached to a process item
//!
//! Nothing here performs I/O against a store; gateways and the processing
//! pipeline live in their own crates.

mod batch;
mod ids;
mod record;
mod resource;

pub use batch::{OperationKind, ProcessBatch, ProcessItem};
pub use ids::{DestinationId, RecordId};
pub use record::{attributes, AttributeValue, Record};
pub use resource::ProcessResource;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("resource '{0}' is closed")]
    ResourceClosed(String),
}
