//! Turns ingest responses into processing batches.

use crate::error::{PipelineResult, ProcessingResult};
use crate::pipeline::{Pipeline, Submission};
use async_trait::async_trait;
use catalog_types::{OperationKind, ProcessBatch, ProcessItem, ProcessResource, Record};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Looks up the binary content belonging to a record.
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn resolve(&self, record: &Record) -> ProcessingResult<Option<ProcessResource>>;
}

/// Submits every ingest response to the pipeline.
///
/// Create and update items get their content attached when a resolver is
/// configured. Attached content is not marked modified, so it is only
/// written back if a plugin replaces or marks it.
pub struct PostIngestHook {
    pipeline: Arc<Pipeline>,
    resolver: Option<Arc<dyn ResourceResolver>>,
}

impl PostIngestHook {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Builds a batch from the records an ingest call just committed and
    /// submits it.
    pub async fn on_ingest(
        &self,
        kind: OperationKind,
        records: Vec<Record>,
        properties: BTreeMap<String, serde_json::Value>,
    ) -> PipelineResult<Submission> {
        let mut batch = ProcessBatch::new(kind);
        for (key, value) in properties {
            batch.set_property(key, value);
        }
        for record in records {
            let item = match (kind, &self.resolver) {
                (OperationKind::Delete, _) | (_, None) => ProcessItem::new(record),
                (_, Some(resolver)) => attach(resolver.as_ref(), record).await,
            };
            batch.push(item);
        }

        debug!(operation = %kind, items = batch.len(), "Submitting post-ingest batch");
        self.pipeline.submit(batch)
    }
}

async fn attach(resolver: &dyn ResourceResolver, record: Record) -> ProcessItem {
    match resolver.resolve(&record).await {
        Ok(Some(resource)) => ProcessItem::new(record).with_resource(resource),
        Ok(None) => ProcessItem::new(record),
        Err(e) => {
            warn!(record_id = %record.id, error = %e, "Could not resolve content, processing metadata only");
            ProcessItem::new(record)
        }
    }
}
