//! The catalog's submission boundary.

use crate::config::CatalogConfig;
use crate::error::{FrameworkError, FrameworkResult};
use catalog_processing::{
    Pipeline, PipelineStats, Plugin, PostIngestHook, ResourceResolver, ShutdownOutcome,
    Submission, WriteFailurePolicy,
};
use catalog_publication::{DestinationRegistry, PublicationReconciler, ReconciliationOutcome};
use catalog_store::{Filter, StoreError, StoreGateway, StoreResult, Subject};
use catalog_types::{DestinationId, OperationKind, Record, RecordId};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

type Properties = BTreeMap<String, serde_json::Value>;

/// Assembles a [`CatalogFramework`].
pub struct CatalogFrameworkBuilder {
    config: CatalogConfig,
    local: Arc<dyn StoreGateway>,
    destinations: DestinationRegistry,
    plugins: Vec<Arc<dyn Plugin>>,
    resolver: Option<Arc<dyn ResourceResolver>>,
    failure_policy: Option<Arc<dyn WriteFailurePolicy>>,
}

impl CatalogFrameworkBuilder {
    pub fn config(mut self, config: CatalogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn destinations(mut self, destinations: DestinationRegistry) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn failure_policy(mut self, policy: Arc<dyn WriteFailurePolicy>) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Builds a stopped framework. Call [`CatalogFramework::start`] before
    /// submitting.
    pub fn build(self) -> CatalogFramework {
        let mut pipeline = Pipeline::new(
            self.config.pipeline.clone(),
            self.plugins,
            Arc::clone(&self.local),
        );
        if let Some(policy) = self.failure_policy {
            pipeline = pipeline.with_failure_policy(policy);
        }
        let pipeline = Arc::new(pipeline);

        let mut hook = PostIngestHook::new(Arc::clone(&pipeline));
        if let Some(resolver) = self.resolver {
            hook = hook.with_resolver(resolver);
        }

        let reconciler = PublicationReconciler::with_config(
            Arc::clone(&self.local),
            self.destinations,
            self.config.reconciler.clone(),
        );

        CatalogFramework {
            subject: Subject::service(self.config.pipeline.service_subject.clone()),
            config: self.config,
            local: self.local,
            reconciler,
            pipeline,
            hook,
        }
    }
}

/// Entry point for ingest notifications and publication management.
pub struct CatalogFramework {
    config: CatalogConfig,
    local: Arc<dyn StoreGateway>,
    reconciler: PublicationReconciler,
    pipeline: Arc<Pipeline>,
    hook: PostIngestHook,
    subject: Subject,
}

impl CatalogFramework {
    pub fn builder(local: Arc<dyn StoreGateway>) -> CatalogFrameworkBuilder {
        CatalogFrameworkBuilder {
            config: CatalogConfig::default(),
            local,
            destinations: DestinationRegistry::new(),
            plugins: Vec::new(),
            resolver: None,
            failure_policy: None,
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn reconciler(&self) -> &PublicationReconciler {
        &self.reconciler
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    pub fn start(&self) -> FrameworkResult<()> {
        self.pipeline.start()?;
        info!(
            destinations = self.reconciler.destinations().len(),
            "Catalog framework started"
        );
        Ok(())
    }

    pub async fn shutdown(&self) -> ShutdownOutcome {
        self.pipeline.shutdown().await
    }

    // ── Ingest notifications ─────────────────────────────────────

    /// Hands records that were just created to the post-ingest pipeline.
    pub async fn submit_create(
        &self,
        records: Vec<Record>,
        properties: Properties,
    ) -> FrameworkResult<Submission> {
        self.submit(OperationKind::Create, records, properties).await
    }

    pub async fn submit_update(
        &self,
        records: Vec<Record>,
        properties: Properties,
    ) -> FrameworkResult<Submission> {
        self.submit(OperationKind::Update, records, properties).await
    }

    pub async fn submit_delete(
        &self,
        records: Vec<Record>,
        properties: Properties,
    ) -> FrameworkResult<Submission> {
        self.submit(OperationKind::Delete, records, properties).await
    }

    async fn submit(
        &self,
        kind: OperationKind,
        records: Vec<Record>,
        properties: Properties,
    ) -> FrameworkResult<Submission> {
        Ok(self.hook.on_ingest(kind, records, properties).await?)
    }

    // ── Publication ──────────────────────────────────────────────

    /// Converges the record's replicas to `desired` and records the new
    /// published set on the local record.
    pub async fn reconcile_publications(
        &self,
        record_id: &RecordId,
        desired: &BTreeSet<DestinationId>,
    ) -> FrameworkResult<ReconciliationOutcome> {
        let outcome = self.reconciler.reconcile(record_id, desired).await?;
        self.record_published(outcome).await
    }

    pub async fn publish(
        &self,
        record_id: &RecordId,
        destination: &DestinationId,
    ) -> FrameworkResult<ReconciliationOutcome> {
        let outcome = self.reconciler.publish(record_id, destination).await?;
        self.record_published(outcome).await
    }

    pub async fn unpublish(
        &self,
        record_id: &RecordId,
        destination: &DestinationId,
    ) -> FrameworkResult<ReconciliationOutcome> {
        let outcome = self.reconciler.unpublish(record_id, destination).await?;
        self.record_published(outcome).await
    }

    /// Re-sends the local record to every destination it is published to.
    pub async fn push_updates(&self, record_id: &RecordId) -> FrameworkResult<ReconciliationOutcome> {
        Ok(self.reconciler.push_updates(record_id).await?)
    }

    /// Writes `published-locations` and `last-published` back onto the local
    /// record when the run changed the published set.
    async fn record_published(
        &self,
        outcome: ReconciliationOutcome,
    ) -> FrameworkResult<ReconciliationOutcome> {
        if !outcome.published_changed() {
            return Ok(outcome);
        }

        match self.write_published(&outcome).await {
            Ok(true) => {
                debug!(record_id = %outcome.record_id, published = outcome.published.len(), "Recorded publication state");
                Ok(outcome)
            }
            Ok(false) => {
                warn!(record_id = %outcome.record_id, "Record vanished before its publication state was recorded");
                Ok(outcome)
            }
            Err(source) => {
                warn!(record_id = %outcome.record_id, error = %source, "Failed to record publication state");
                Err(FrameworkError::PublicationNotRecorded {
                    record_id: outcome.record_id.clone(),
                    outcome: Box::new(outcome),
                    source,
                })
            }
        }
    }

    async fn write_published(&self, outcome: &ReconciliationOutcome) -> StoreResult<bool> {
        self.subject
            .clone()
            .run_as(self.store_published(outcome))
            .await
    }

    /// Returns `false` when the local record no longer exists.
    async fn store_published(&self, outcome: &ReconciliationOutcome) -> StoreResult<bool> {
        let Some(mut record) = self.find_local(&outcome.record_id).await? else {
            return Ok(false);
        };
        record.set_published_locations(&outcome.published);
        record.set_last_published(Utc::now());

        let id = record.id.clone();
        let written = self.local.update(vec![record]).await?;
        if written.contains(&id) {
            return Ok(true);
        }
        let reason = written
            .failed
            .into_iter()
            .map(|f| f.reason)
            .collect::<Vec<_>>()
            .join("; ");
        Err(StoreError::Rejected(reason))
    }

    async fn find_local(&self, record_id: &RecordId) -> StoreResult<Option<Record>> {
        if let Some(record) = self.local.get(record_id).await? {
            return Ok(Some(record));
        }
        let mut found = self
            .local
            .query(&Filter::RegistryId(record_id.to_string()))
            .await?;
        Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
    }
}
