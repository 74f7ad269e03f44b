//! In-memory store gateway.
//!
//! Holds records and content in maps and keeps an account of every call it
//! receives, which lets tests assert exactly which gateway operations a
//! component issued. Faults can be injected per operation, either for the
//! next call only or for every call, and individual records can be made to
//! fail inside an otherwise successful write.

use crate::error::{StoreError, StoreResult};
use crate::gateway::{
    ContentUpdate, CreateOutcome, DeleteOutcome, FailedItem, Filter, StoreGateway, UpdateOutcome,
};
use crate::subject::Subject;
use async_trait::async_trait;
use catalog_types::{DestinationId, Record, RecordId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Gateway operations, used for call accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Query,
    Create,
    Update,
    Delete,
    UpdateContent,
}

impl StoreOperation {
    const ALL: [StoreOperation; 5] = [
        Self::Query,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::UpdateContent,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn is_write(self) -> bool {
        !matches!(self, Self::Query)
    }
}

/// Content stored alongside a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct Faults {
    next: HashMap<StoreOperation, VecDeque<StoreError>>,
    always: HashMap<StoreOperation, StoreError>,
    rejected_records: HashMap<RecordId, String>,
}

/// A store gateway backed by in-memory maps.
pub struct MemoryStore {
    id: DestinationId,
    records: RwLock<BTreeMap<RecordId, Record>>,
    content: RwLock<HashMap<RecordId, StoredContent>>,
    calls: [AtomicUsize; 5],
    faults: Mutex<Faults>,
    write_subjects: Mutex<Vec<(StoreOperation, Option<Subject>)>>,
}

impl MemoryStore {
    pub fn new(id: impl Into<DestinationId>) -> Self {
        Self {
            id: id.into(),
            records: RwLock::new(BTreeMap::new()),
            content: RwLock::new(HashMap::new()),
            calls: Default::default(),
            faults: Mutex::new(Faults::default()),
            write_subjects: Mutex::new(Vec::new()),
        }
    }

    // ── Seeding and inspection (not counted as calls) ────────────

    /// Inserts or replaces a record without going through the gateway.
    pub async fn insert(&self, record: Record) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Reads a record without going through the gateway.
    pub async fn record(&self, id: &RecordId) -> Option<Record> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn content(&self, id: &RecordId) -> Option<StoredContent> {
        self.content.read().await.get(id).cloned()
    }

    // ── Call accounting ──────────────────────────────────────────

    /// Number of calls received for one operation.
    pub fn calls(&self, op: StoreOperation) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        StoreOperation::ALL.iter().map(|op| self.calls(*op)).sum()
    }

    /// Number of create, update, delete and content calls received.
    pub fn write_calls(&self) -> usize {
        StoreOperation::ALL
            .iter()
            .filter(|op| op.is_write())
            .map(|op| self.calls(*op))
            .sum()
    }

    /// Subjects that were current when each write call arrived.
    pub async fn write_subjects(&self) -> Vec<(StoreOperation, Option<Subject>)> {
        self.write_subjects.lock().await.clone()
    }

    // ── Fault injection ──────────────────────────────────────────

    /// Fails the next call of `op` with `error`. Queued errors are consumed
    /// in order.
    pub async fn fail_next(&self, op: StoreOperation, error: StoreError) {
        self.faults
            .lock()
            .await
            .next
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fails every call of `op` with `error` until cleared.
    pub async fn fail_always(&self, op: StoreOperation, error: StoreError) {
        self.faults.lock().await.always.insert(op, error);
    }

    /// Makes every write naming `id` report it as failed while the rest of
    /// the call succeeds.
    pub async fn reject_record(&self, id: impl Into<RecordId>, reason: impl Into<String>) {
        self.faults
            .lock()
            .await
            .rejected_records
            .insert(id.into(), reason.into());
    }

    pub async fn clear_faults(&self) {
        *self.faults.lock().await = Faults::default();
    }

    async fn enter(&self, op: StoreOperation) -> StoreResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        if op.is_write() {
            self.write_subjects
                .lock()
                .await
                .push((op, Subject::current()));
        }

        let mut faults = self.faults.lock().await;
        if let Some(err) = faults.next.get_mut(&op).and_then(VecDeque::pop_front) {
            debug!(store = %self.id, ?op, error = %err, "Injected fault (next)");
            return Err(err);
        }
        if let Some(err) = faults.always.get(&op) {
            debug!(store = %self.id, ?op, error = %err, "Injected fault (always)");
            return Err(err.clone());
        }
        Ok(())
    }

    async fn rejected(&self) -> HashMap<RecordId, String> {
        self.faults.lock().await.rejected_records.clone()
    }
}

#[async_trait]
impl StoreGateway for MemoryStore {
    fn id(&self) -> &DestinationId {
        &self.id
    }

    async fn query(&self, filter: &Filter) -> StoreResult<Vec<Record>> {
        self.enter(StoreOperation::Query).await?;
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }

    async fn create(&self, records: Vec<Record>) -> StoreResult<CreateOutcome> {
        self.enter(StoreOperation::Create).await?;
        let rejected = self.rejected().await;
        let mut stored = self.records.write().await;
        let mut outcome = CreateOutcome::default();

        for record in records {
            if let Some(reason) = rejected.get(&record.id) {
                outcome.failed.push(FailedItem::new(record.id, reason.clone()));
            } else if stored.contains_key(&record.id) {
                outcome
                    .failed
                    .push(FailedItem::new(record.id, "record already exists"));
            } else {
                stored.insert(record.id.clone(), record.clone());
                outcome.created.push(record);
            }
        }
        Ok(outcome)
    }

    async fn update(&self, records: Vec<Record>) -> StoreResult<UpdateOutcome> {
        self.enter(StoreOperation::Update).await?;
        let rejected = self.rejected().await;
        let mut stored = self.records.write().await;
        Ok(apply_updates(&mut stored, &rejected, records))
    }

    async fn delete(&self, ids: Vec<RecordId>) -> StoreResult<DeleteOutcome> {
        self.enter(StoreOperation::Delete).await?;
        let rejected = self.rejected().await;
        let mut stored = self.records.write().await;
        let mut content = self.content.write().await;
        let mut outcome = DeleteOutcome::default();

        let mut seen = HashSet::new();
        for id in ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(reason) = rejected.get(&id) {
                outcome.failed.push(FailedItem::new(id, reason.clone()));
            } else if stored.remove(&id).is_some() {
                content.remove(&id);
                outcome.deleted.push(id);
            } else {
                outcome.failed.push(FailedItem::new(id, "record not found"));
            }
        }
        Ok(outcome)
    }

    async fn update_content(&self, items: Vec<ContentUpdate>) -> StoreResult<UpdateOutcome> {
        self.enter(StoreOperation::UpdateContent).await?;
        let rejected = self.rejected().await;

        // Read every resource before touching the maps so a failed read
        // leaves the store unchanged.
        let mut staged = Vec::with_capacity(items.len());
        for item in items {
            let bytes = item
                .resource
                .read_all()
                .await
                .map_err(|e| StoreError::Rejected(format!("unreadable content: {e}")))?;
            staged.push((item.record, item.resource, bytes));
        }

        let mut stored = self.records.write().await;
        let mut content = self.content.write().await;
        let records: Vec<Record> = staged.iter().map(|(r, _, _)| r.clone()).collect();
        let outcome = apply_updates(&mut stored, &rejected, records);

        for (record, resource, bytes) in staged {
            if outcome.contains(&record.id) {
                content.insert(
                    record.id,
                    StoredContent {
                        name: resource.name().to_string(),
                        mime_type: resource.mime_type().to_string(),
                        bytes,
                    },
                );
            }
        }
        Ok(outcome)
    }
}

fn apply_updates(
    stored: &mut BTreeMap<RecordId, Record>,
    rejected: &HashMap<RecordId, String>,
    records: Vec<Record>,
) -> UpdateOutcome {
    let mut outcome = UpdateOutcome::default();
    for record in records {
        if let Some(reason) = rejected.get(&record.id) {
            outcome.failed.push(FailedItem::new(record.id, reason.clone()));
        } else if let Some(existing) = stored.get_mut(&record.id) {
            *existing = record.clone();
            outcome.updated.push(record);
        } else {
            outcome
                .failed
                .push(FailedItem::new(record.id, "record not found"));
        }
    }
    outcome
}
