#![allow(dead_code)]

use async_trait::async_trait;
use catalog_processing::{
    Pipeline, PipelineConfig, Plugin, PluginOutcome, ProcessingError, ProcessingResult,
};
use catalog_store::{MemoryStore, StoreGateway};
use catalog_types::{OperationKind, ProcessBatch, ProcessItem, ProcessResource, Record};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> PipelineConfig {
    PipelineConfig {
        pool_size: 2,
        queue_capacity: 16,
        graceful_timeout_ms: 2_000,
        force_timeout_ms: 500,
        service_subject: "indexer".to_string(),
    }
}

pub fn pipeline(plugins: Vec<Arc<dyn Plugin>>, store: &Arc<MemoryStore>) -> Pipeline {
    init_tracing();
    Pipeline::new(config(), plugins, store.clone() as Arc<dyn StoreGateway>)
}

pub fn batch(kind: OperationKind, records: &[&Record]) -> ProcessBatch {
    ProcessBatch::with_items(
        kind,
        records.iter().map(|r| ProcessItem::new((*r).clone())).collect(),
    )
}

/// Polls until `n` batches have completed.
pub async fn wait_completed(pipeline: &Pipeline, n: u64) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while pipeline.stats().completed < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {n} completed batches");
}

// ── Plugins ──────────────────────────────────────────────────────

/// Sets one attribute on every item.
pub struct Tag {
    pub attribute: &'static str,
    pub value: &'static str,
}

impl Tag {
    pub fn new(attribute: &'static str, value: &'static str) -> Arc<dyn Plugin> {
        Arc::new(Self { attribute, value })
    }

    fn apply(&self, mut batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        for item in batch.items_mut() {
            item.set_attribute(self.attribute, self.value);
        }
        Ok(PluginOutcome::Changed(batch))
    }
}

#[async_trait]
impl Plugin for Tag {
    fn name(&self) -> &str {
        self.attribute
    }
    async fn process_create(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.apply(batch)
    }
    async fn process_update(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.apply(batch)
    }
    async fn process_delete(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.apply(batch)
    }
}

/// Mutates the batch, then fails, so the mutation must be discarded.
pub struct Failing;

#[async_trait]
impl Plugin for Failing {
    fn name(&self) -> &str {
        "failing"
    }
    async fn process_create(&self, mut batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        for item in batch.items_mut() {
            item.set_attribute("poisoned", true);
        }
        Err(ProcessingError::Rejected("refusing".into()))
    }
}

pub struct Panicking;

#[async_trait]
impl Plugin for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }
    async fn process_create(&self, _batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        panic!("plugin blew up");
    }
}

/// Records the attribute names of the first item of every batch it sees.
#[derive(Default)]
pub struct Observer {
    pub seen: Mutex<Vec<(OperationKind, Vec<String>)>>,
}

impl Observer {
    fn observe(&self, batch: &ProcessBatch) {
        let names = batch
            .items()
            .first()
            .map(|i| i.record().attributes.keys().cloned().collect())
            .unwrap_or_default();
        self.seen.lock().unwrap().push((batch.kind(), names));
    }

    pub fn seen(&self) -> Vec<(OperationKind, Vec<String>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Plugin for Observer {
    fn name(&self) -> &str {
        "observer"
    }
    async fn process_create(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.observe(&batch);
        Ok(PluginOutcome::Unchanged)
    }
    async fn process_update(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.observe(&batch);
        Ok(PluginOutcome::Unchanged)
    }
    async fn process_delete(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.observe(&batch);
        Ok(PluginOutcome::Unchanged)
    }
}

/// Returns the batch as `Changed` without touching any item.
pub struct PassThrough;

#[async_trait]
impl Plugin for PassThrough {
    fn name(&self) -> &str {
        "pass-through"
    }
    async fn process_create(&self, batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        Ok(PluginOutcome::Changed(batch))
    }
}

/// Replaces every item's content with fixed bytes.
pub struct Rewrite(pub &'static [u8]);

#[async_trait]
impl Plugin for Rewrite {
    fn name(&self) -> &str {
        "rewrite"
    }
    async fn process_create(&self, mut batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        for item in batch.items_mut() {
            if item.resource().is_some() {
                item.replace_resource(ProcessResource::from_bytes("rewritten.txt", "text/plain", self.0));
            }
        }
        Ok(PluginOutcome::Changed(batch))
    }
}

/// Signals when it starts, then waits until released.
#[derive(Default)]
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

#[async_trait]
impl Plugin for Gate {
    fn name(&self) -> &str {
        "gate"
    }
    async fn process_create(&self, _batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(PluginOutcome::Unchanged)
    }
}

/// Never finishes.
pub struct Stuck;

#[async_trait]
impl Plugin for Stuck {
    fn name(&self) -> &str {
        "stuck"
    }
    async fn process_create(&self, _batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        std::future::pending::<()>().await;
        Ok(PluginOutcome::Unchanged)
    }
}

/// Blocks its worker thread, so aborting the task cannot interrupt it.
pub struct Blocking(pub Duration);

#[async_trait]
impl Plugin for Blocking {
    fn name(&self) -> &str {
        "blocking"
    }
    async fn process_create(&self, _batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        std::thread::sleep(self.0);
        Ok(PluginOutcome::Unchanged)
    }
}

/// Takes a little while.
pub struct Slow(pub Duration);

#[async_trait]
impl Plugin for Slow {
    fn name(&self) -> &str {
        "slow"
    }
    async fn process_create(&self, _batch: ProcessBatch) -> ProcessingResult<PluginOutcome> {
        tokio::time::sleep(self.0).await;
        Ok(PluginOutcome::Unchanged)
    }
}

// ── Resources ────────────────────────────────────────────────────

/// A reader that counts how many times it has been dropped.
pub struct CountingReader {
    data: &'static [u8],
    pos: usize,
    drops: Arc<AtomicUsize>,
}

impl CountingReader {
    pub fn resource(data: &'static [u8]) -> (ProcessResource, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        let reader = Self {
            data,
            pos: 0,
            drops: drops.clone(),
        };
        let resource = ProcessResource::from_reader("original.txt", "text/plain", Some(data.len() as u64), reader);
        (resource, drops)
    }
}

impl AsyncRead for CountingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl Drop for CountingReader {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
