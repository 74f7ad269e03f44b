//! The store gateway capability set.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use catalog_types::{AttributeValue, DestinationId, ProcessResource, Record, RecordId};
use serde::{Deserialize, Serialize};

/// Selects records in a store.
///
/// Only the selectors the core needs are modelled; the query planner of a
/// real catalog is an external concern.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Id(RecordId),
    Ids(Vec<RecordId>),
    RegistryId(String),
    Attribute { name: String, value: AttributeValue },
}

impl Filter {
    /// Evaluates the filter against a record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Id(id) => &record.id == id,
            Self::Ids(ids) => ids.contains(&record.id),
            Self::RegistryId(registry_id) => record.registry_id() == Some(registry_id.as_str()),
            Self::Attribute { name, value } => record.get(name) == Some(value),
        }
    }
}

/// A record that a store refused, with the store's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: RecordId,
    pub reason: String,
}

impl FailedItem {
    pub fn new(id: RecordId, reason: impl Into<String>) -> Self {
        Self {
            id,
            reason: reason.into(),
        }
    }
}

/// Result of a create call. Partial success is legal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOutcome {
    pub created: Vec<Record>,
    pub failed: Vec<FailedItem>,
}

impl CreateOutcome {
    pub fn contains(&self, id: &RecordId) -> bool {
        self.created.iter().any(|r| &r.id == id)
    }
}

/// Result of an update or content update call. Partial success is legal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub updated: Vec<Record>,
    pub failed: Vec<FailedItem>,
}

impl UpdateOutcome {
    pub fn contains(&self, id: &RecordId) -> bool {
        self.updated.iter().any(|r| &r.id == id)
    }
}

/// Result of a delete call. Partial success is legal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub deleted: Vec<RecordId>,
    pub failed: Vec<FailedItem>,
}

/// New content for a record, written together with the record.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
    pub record: Record,
    pub resource: ProcessResource,
}

/// The capability set every catalog store exposes to the core.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Identifier of the store this gateway talks to.
    fn id(&self) -> &DestinationId;

    async fn query(&self, filter: &Filter) -> StoreResult<Vec<Record>>;

    async fn create(&self, records: Vec<Record>) -> StoreResult<CreateOutcome>;

    async fn update(&self, records: Vec<Record>) -> StoreResult<UpdateOutcome>;

    async fn delete(&self, ids: Vec<RecordId>) -> StoreResult<DeleteOutcome>;

    /// Writes records together with new binary content. Stores that hold no
    /// content keep the default, which refuses the call.
    async fn update_content(&self, items: Vec<ContentUpdate>) -> StoreResult<UpdateOutcome> {
        let _ = items;
        Err(StoreError::Unsupported(format!(
            "store '{}' does not hold content",
            self.id()
        )))
    }

    /// Fetches a single record by id.
    async fn get(&self, id: &RecordId) -> StoreResult<Option<Record>> {
        let mut found = self.query(&Filter::Id(id.clone())).await?;
        Ok(if found.is_empty() { None } else { Some(found.swap_remove(0)) })
    }
}
