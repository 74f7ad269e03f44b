//! The plugin contract.

use crate::error::ProcessingResult;
use async_trait::async_trait;
use catalog_types::ProcessBatch;

/// What a plugin did with the batch it was given.
#[derive(Debug)]
pub enum PluginOutcome {
    /// The plugin produced a new batch; later plugins see this one.
    Changed(ProcessBatch),
    /// The plugin made no changes worth keeping.
    Unchanged,
}

/// A step in the post-ingest chain.
///
/// Each method receives its own copy of the batch. Returning
/// [`PluginOutcome::Unchanged`] or an error discards that copy, so a plugin
/// that fails halfway never leaks partial mutations into the chain.
///
/// Mutations should go through the item setters
/// ([`ProcessItem::set_attribute`](catalog_types::ProcessItem::set_attribute),
/// [`ProcessItem::replace_resource`](catalog_types::ProcessItem::replace_resource))
/// or mark the item modified explicitly; unmarked changes are not persisted.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn process_create(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        let _ = batch;
        Ok(PluginOutcome::Unchanged)
    }

    async fn process_update(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        let _ = batch;
        Ok(PluginOutcome::Unchanged)
    }

    async fn process_delete(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        let _ = batch;
        Ok(PluginOutcome::Unchanged)
    }
}
