//! Reconciler — executes a publication diff against the destination stores.

use crate::config::ReconcilerConfig;
use crate::diff::diff;
use crate::error::{PublicationError, PublicationResult};
use crate::outcome::{DestinationFailure, PublicationOp, ReconciliationOutcome};
use crate::registry::DestinationRegistry;
use catalog_store::{Filter, StoreGateway};
use catalog_types::{DestinationId, Record, RecordId};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One remote operation on one destination.
#[derive(Debug, Clone)]
struct Job {
    destination: DestinationId,
    op: PublicationOp,
}

type JobResult = (Job, Result<(), DestinationFailure>);

/// Converges a record's actual publication state to a desired set.
pub struct PublicationReconciler {
    local: Arc<dyn StoreGateway>,
    destinations: DestinationRegistry,
    config: ReconcilerConfig,
}

impl PublicationReconciler {
    /// Creates a reconciler with the default configuration.
    pub fn new(local: Arc<dyn StoreGateway>, destinations: DestinationRegistry) -> Self {
        Self::with_config(local, destinations, ReconcilerConfig::default())
    }

    pub fn with_config(
        local: Arc<dyn StoreGateway>,
        destinations: DestinationRegistry,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            local,
            destinations,
            config,
        }
    }

    pub fn destinations(&self) -> &DestinationRegistry {
        &self.destinations
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Creates the record on every destination in `desired` that does not
    /// hold it yet and deletes it from every published destination not in
    /// `desired`.
    ///
    /// Only a failure to read the local record is an error. Failures on
    /// individual destinations are reported in the outcome.
    pub async fn reconcile(
        &self,
        record_id: &RecordId,
        desired: &BTreeSet<DestinationId>,
    ) -> PublicationResult<ReconciliationOutcome> {
        let record = self.fetch_local(record_id).await?;
        // Snapshot of the desired set; it is not consulted again.
        let desired = desired.clone();
        Ok(self.converge(record_id, record.as_ref(), &desired).await)
    }

    /// Adds one destination to the record's published set.
    pub async fn publish(
        &self,
        record_id: &RecordId,
        destination: &DestinationId,
    ) -> PublicationResult<ReconciliationOutcome> {
        let record = self.fetch_local(record_id).await?;
        let mut desired = published_of(record.as_ref());
        desired.insert(destination.clone());
        Ok(self.converge(record_id, record.as_ref(), &desired).await)
    }

    /// Removes one destination from the record's published set.
    pub async fn unpublish(
        &self,
        record_id: &RecordId,
        destination: &DestinationId,
    ) -> PublicationResult<ReconciliationOutcome> {
        let record = self.fetch_local(record_id).await?;
        let mut desired = published_of(record.as_ref());
        desired.remove(destination);
        Ok(self.converge(record_id, record.as_ref(), &desired).await)
    }

    /// Re-sends the current local record to every destination it is
    /// published to. The published set is never changed by this call.
    pub async fn push_updates(
        &self,
        record_id: &RecordId,
    ) -> PublicationResult<ReconciliationOutcome> {
        let record = self
            .fetch_local(record_id)
            .await?
            .ok_or_else(|| PublicationError::RecordNotFound(record_id.clone()))?;
        let published = record.published_locations();

        let jobs = published
            .iter()
            .map(|d| Job {
                destination: d.clone(),
                op: PublicationOp::Update,
            })
            .collect();
        let results = self.execute(jobs, Some(&record)).await;

        let mut outcome = ReconciliationOutcome::unchanged(record_id.clone(), published);
        for (job, result) in results {
            match result {
                Ok(()) => {
                    outcome.updated.insert(job.destination);
                }
                Err(failure) => {
                    outcome.failures.insert(job.destination, failure);
                }
            }
        }

        info!(
            record_id = %record_id,
            updated = outcome.updated.len(),
            failed = outcome.failures.len(),
            "Pushed record updates to published destinations"
        );
        Ok(outcome)
    }

    // ── Internals ────────────────────────────────────────────────

    /// Reads the local record by id, falling back to treating the id as a
    /// registry id. Absence is not an error.
    async fn fetch_local(&self, record_id: &RecordId) -> PublicationResult<Option<Record>> {
        let state_err = |source| PublicationError::StateQuery {
            record_id: record_id.clone(),
            source,
        };

        let mut found = self
            .local
            .query(&Filter::Id(record_id.clone()))
            .await
            .map_err(state_err)?;
        if found.is_empty() {
            found = self
                .local
                .query(&Filter::RegistryId(record_id.to_string()))
                .await
                .map_err(state_err)?;
        }
        if found.len() > 1 {
            warn!(
                record_id = %record_id,
                matches = found.len(),
                "Multiple local records match, using the first"
            );
        }
        Ok(found.into_iter().next())
    }

    async fn converge(
        &self,
        record_id: &RecordId,
        record: Option<&Record>,
        desired: &BTreeSet<DestinationId>,
    ) -> ReconciliationOutcome {
        let current = published_of(record);
        let plan = diff(&current, desired);

        if plan.is_empty() {
            debug!(record_id = %record_id, "Publication state already converged");
            return ReconciliationOutcome::unchanged(record_id.clone(), current);
        }

        debug!(
            record_id = %record_id,
            create = plan.to_create.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged.len(),
            "Reconciling publications"
        );

        let jobs = plan
            .to_create
            .iter()
            .map(|d| Job {
                destination: d.clone(),
                op: PublicationOp::Create,
            })
            .chain(plan.to_delete.iter().map(|d| Job {
                destination: d.clone(),
                op: PublicationOp::Delete,
            }))
            .collect();
        let results = self.execute(jobs, record).await;

        let mut outcome = ReconciliationOutcome::unchanged(record_id.clone(), current);
        for (job, result) in results {
            match (job.op, result) {
                (PublicationOp::Create, Ok(())) => {
                    outcome.published.insert(job.destination.clone());
                    outcome.created.insert(job.destination);
                }
                (PublicationOp::Delete, Ok(())) => {
                    outcome.published.remove(&job.destination);
                    outcome.deleted.insert(job.destination);
                }
                (PublicationOp::Update, Ok(())) => {
                    outcome.updated.insert(job.destination);
                }
                (_, Err(failure)) => {
                    outcome.failures.insert(job.destination, failure);
                }
            }
        }

        info!(
            record_id = %record_id,
            created = outcome.created.len(),
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            "Reconciled publications"
        );
        outcome
    }

    /// Runs every job, at most `max_concurrency` at a time. Each job's
    /// failure is captured in its own result.
    async fn execute(&self, jobs: Vec<Job>, record: Option<&Record>) -> Vec<JobResult> {
        let replica = record.map(Record::to_replica);
        let replica = replica.as_ref();
        let limit = self.config.max_concurrency.max(1);

        stream::iter(jobs)
            .map(|job| async move {
                let result = self.run_job(&job, record, replica).await;
                if let Err(failure) = &result {
                    warn!(
                        destination = %job.destination,
                        op = %job.op,
                        reason = %failure.reason,
                        "Publication operation failed"
                    );
                }
                (job, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    async fn run_job(
        &self,
        job: &Job,
        record: Option<&Record>,
        replica: Option<&Record>,
    ) -> Result<(), DestinationFailure> {
        let gateway = self.destinations.get(&job.destination).ok_or_else(|| {
            DestinationFailure::new(job.op, format!("unknown destination '{}'", job.destination))
        })?;

        let (Some(record), Some(replica)) = (record, replica) else {
            return Err(DestinationFailure::new(job.op, "record not found locally"));
        };

        match job.op {
            PublicationOp::Create => create_on(gateway.as_ref(), record, replica).await,
            PublicationOp::Delete => delete_from(gateway.as_ref(), record).await,
            PublicationOp::Update => update_on(gateway.as_ref(), replica).await,
        }
    }
}

fn published_of(record: Option<&Record>) -> BTreeSet<DestinationId> {
    record.map(Record::published_locations).unwrap_or_default()
}

/// How the record is found on a remote store: by registry id when it has
/// one, otherwise by its own id.
fn correlation_filter(record: &Record) -> Filter {
    match record.registry_id() {
        Some(registry_id) => Filter::RegistryId(registry_id.to_string()),
        None => Filter::Id(record.id.clone()),
    }
}

async fn create_on(
    gateway: &dyn StoreGateway,
    record: &Record,
    replica: &Record,
) -> Result<(), DestinationFailure> {
    let outcome = gateway
        .create(vec![replica.clone()])
        .await
        .map_err(|e| DestinationFailure::from_store(PublicationOp::Create, &e))?;

    if outcome.contains(&replica.id) {
        debug!(destination = %gateway.id(), record_id = %record.id, "Created replica");
        return Ok(());
    }

    let reason = outcome
        .failed
        .iter()
        .map(|f| f.reason.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    // A replica left behind by an earlier run whose result was never
    // recorded is adopted instead of failing forever.
    match gateway.query(&correlation_filter(record)).await {
        Ok(existing) if !existing.is_empty() => {
            debug!(destination = %gateway.id(), record_id = %record.id, "Adopted existing replica");
            Ok(())
        }
        _ => Err(DestinationFailure::new(
            PublicationOp::Create,
            if reason.is_empty() { "create not acknowledged".to_string() } else { reason },
        )),
    }
}

async fn delete_from(gateway: &dyn StoreGateway, record: &Record) -> Result<(), DestinationFailure> {
    let existing = gateway
        .query(&correlation_filter(record))
        .await
        .map_err(|e| DestinationFailure::from_store(PublicationOp::Delete, &e))?;

    if existing.is_empty() {
        debug!(destination = %gateway.id(), record_id = %record.id, "Replica already absent");
        return Ok(());
    }

    let ids: Vec<RecordId> = existing.into_iter().map(|r| r.id).collect();
    let outcome = gateway
        .delete(ids)
        .await
        .map_err(|e| DestinationFailure::from_store(PublicationOp::Delete, &e))?;

    if outcome.failed.is_empty() {
        debug!(destination = %gateway.id(), record_id = %record.id, "Deleted replica");
        Ok(())
    } else {
        let reason = outcome
            .failed
            .iter()
            .map(|f| format!("{}: {}", f.id, f.reason))
            .collect::<Vec<_>>()
            .join("; ");
        Err(DestinationFailure::new(PublicationOp::Delete, reason))
    }
}

async fn update_on(gateway: &dyn StoreGateway, replica: &Record) -> Result<(), DestinationFailure> {
    let outcome = gateway
        .update(vec![replica.clone()])
        .await
        .map_err(|e| DestinationFailure::from_store(PublicationOp::Update, &e))?;

    if outcome.contains(&replica.id) {
        Ok(())
    } else {
        let reason = outcome
            .failed
            .into_iter()
            .map(|f| f.reason)
            .collect::<Vec<_>>()
            .join("; ");
        Err(DestinationFailure::new(PublicationOp::Update, reason))
    }
}
