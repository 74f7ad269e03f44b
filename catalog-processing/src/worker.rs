//! One processing run: plugin chain, write-back, resource cleanup.

use crate::plugin::{Plugin, PluginOutcome};
use crate::policy::{FailedWrite, WriteFailurePolicy, WriteKind};
use crate::stats::Counters;
use catalog_store::{ContentUpdate, StoreGateway, Subject, UpdateOutcome};
use catalog_types::{OperationKind, ProcessBatch, ProcessResource, Record};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, trace, warn};

/// Everything a worker needs, shared by all workers of one run.
pub(crate) struct WorkerContext {
    pub plugins: Arc<[Arc<dyn Plugin>]>,
    pub gateway: Arc<dyn StoreGateway>,
    pub failure_policy: Arc<dyn WriteFailurePolicy>,
    pub subject: Subject,
    pub counters: Arc<Counters>,
}

/// Pulls batches until the queue is closed and empty.
pub(crate) async fn worker_loop(
    worker: usize,
    ctx: Arc<WorkerContext>,
    queue: Arc<Mutex<mpsc::Receiver<ProcessBatch>>>,
) {
    debug!(worker, "Pipeline worker started");
    loop {
        let next = queue.lock().await.recv().await;
        let Some(batch) = next else { break };
        process_batch(&ctx, batch).await;
    }
    debug!(worker, "Pipeline worker stopped");
}

pub(crate) async fn process_batch(ctx: &WorkerContext, batch: ProcessBatch) {
    let kind = batch.kind();
    let items = batch.len();
    let mut ledger = ResourceLedger::default();
    ledger.track(&batch);

    let run = AssertUnwindSafe(async {
        let batch = run_chain(ctx, batch, &mut ledger).await;
        if kind == OperationKind::Delete {
            debug!(items, "Delete batch processed, nothing to persist");
        } else {
            persist(ctx, &batch).await;
        }
    });
    if let Err(panic) = run.catch_unwind().await {
        error!(operation = %kind, panic = %panic_message(&*panic), "Processing run panicked");
    }

    ledger.close_all().await;
    Counters::bump(&ctx.counters.completed);
}

async fn run_chain(
    ctx: &WorkerContext,
    mut current: ProcessBatch,
    ledger: &mut ResourceLedger,
) -> ProcessBatch {
    let kind = current.kind();
    for plugin in ctx.plugins.iter() {
        let input = current.clone();
        let call = match kind {
            OperationKind::Create => plugin.process_create(input),
            OperationKind::Update => plugin.process_update(input),
            OperationKind::Delete => plugin.process_delete(input),
        };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(PluginOutcome::Changed(next))) => {
                trace!(plugin = plugin.name(), operation = %kind, "Plugin changed batch");
                ledger.track(&next);
                current = next;
            }
            Ok(Ok(PluginOutcome::Unchanged)) => {}
            Ok(Err(e)) => {
                Counters::bump(&ctx.counters.plugin_failures);
                warn!(plugin = plugin.name(), operation = %kind, error = %e, "Plugin failed, continuing");
            }
            Err(panic) => {
                Counters::bump(&ctx.counters.plugin_failures);
                error!(
                    plugin = plugin.name(),
                    operation = %kind,
                    panic = %panic_message(&*panic),
                    "Plugin panicked, continuing"
                );
            }
        }
    }
    current
}

/// Writes modified content first, then modified metadata, under the service
/// subject. A failed content call leaves the metadata unwritten.
async fn persist(ctx: &WorkerContext, batch: &ProcessBatch) {
    let kind = batch.kind();
    let mut content = Vec::new();
    let mut metadata = Vec::new();
    for item in batch.items() {
        match item.resource() {
            Some(resource) if item.is_resource_modified() => content.push(ContentUpdate {
                record: item.record().clone(),
                resource: resource.clone(),
            }),
            _ if item.is_metacard_modified() => metadata.push(item.record().clone()),
            _ => {}
        }
    }

    if content.is_empty() && metadata.is_empty() {
        debug!(operation = %kind, "No changes to persist");
        return;
    }

    ctx.subject
        .clone()
        .run_as(async {
            if !content.is_empty() {
                let records: Vec<Record> = content.iter().map(|c| c.record.clone()).collect();
                match ctx.gateway.update_content(content).await {
                    Ok(outcome) => report_rejected(ctx, WriteKind::Content, kind, records, outcome),
                    Err(e) => {
                        warn!(operation = %kind, records = records.len(), error = %e, "Content write failed");
                        fail(ctx, FailedWrite::from_error(WriteKind::Content, kind, records, &e));
                        if !metadata.is_empty() {
                            warn!(records = metadata.len(), "Skipping metadata write after content failure");
                            fail(
                                ctx,
                                FailedWrite::rejected(
                                    WriteKind::Metadata,
                                    kind,
                                    metadata,
                                    "skipped after content write failure".to_string(),
                                ),
                            );
                        }
                        return;
                    }
                }
            }

            if !metadata.is_empty() {
                let records = metadata.clone();
                match ctx.gateway.update(metadata).await {
                    Ok(outcome) => report_rejected(ctx, WriteKind::Metadata, kind, records, outcome),
                    Err(e) => {
                        warn!(operation = %kind, records = records.len(), error = %e, "Metadata write failed");
                        fail(ctx, FailedWrite::from_error(WriteKind::Metadata, kind, records, &e));
                    }
                }
            }
        })
        .await;
}

/// Hands items the store refused inside an otherwise successful call to the
/// failure policy.
fn report_rejected(
    ctx: &WorkerContext,
    write: WriteKind,
    operation: OperationKind,
    mut records: Vec<Record>,
    outcome: UpdateOutcome,
) {
    debug!(kind = %write, updated = outcome.updated.len(), "Persisted processing results");
    if outcome.failed.is_empty() {
        return;
    }
    let reason = outcome
        .failed
        .iter()
        .map(|f| format!("{}: {}", f.id, f.reason))
        .collect::<Vec<_>>()
        .join("; ");
    records.retain(|r| outcome.failed.iter().any(|f| f.id == r.id));
    warn!(kind = %write, failed = records.len(), %reason, "Store refused some records");
    fail(ctx, FailedWrite::rejected(write, operation, records, reason));
}

fn fail(ctx: &WorkerContext, failure: FailedWrite) {
    Counters::bump(&ctx.counters.failed_writes);
    ctx.failure_policy.handle(failure);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Every distinct resource seen during a run.
#[derive(Default)]
struct ResourceLedger {
    resources: Vec<ProcessResource>,
}

impl ResourceLedger {
    fn track(&mut self, batch: &ProcessBatch) {
        for resource in batch.resources() {
            if !self.resources.iter().any(|known| known.same_as(resource)) {
                self.resources.push(resource.clone());
            }
        }
    }

    async fn close_all(&mut self) {
        for resource in std::mem::take(&mut self.resources) {
            if !resource.close().await {
                trace!(resource = resource.name(), "Resource was already closed");
            }
        }
    }
}

/// A run dropped before `close_all` (an aborted worker) still closes its
/// resources.
impl Drop for ResourceLedger {
    fn drop(&mut self) {
        if self.resources.is_empty() {
            return;
        }
        warn!(resources = self.resources.len(), "Processing run cancelled, closing its resources");
        for resource in self.resources.drain(..) {
            if resource.try_close().is_some() {
                continue;
            }
            // A reader still holds the body; close once it lets go.
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        resource.close().await;
                    });
                }
                Err(_) => error!(resource = resource.name(), "Resource left open, no runtime to close it"),
            }
        }
    }
}
