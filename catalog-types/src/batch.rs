//! Process items and batches handed to post-ingest plugins.

use crate::{AttributeValue, ProcessResource, Record};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The catalog operation that produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One record flowing through the plugin chain, with its optional content.
///
/// The two flags drive persistence after the chain completes: a modified
/// resource triggers a content write, a modified record alone triggers a
/// metadata write, and an untouched item is never written.
#[derive(Debug, Clone)]
pub struct ProcessItem {
    record: Record,
    resource: Option<ProcessResource>,
    metacard_modified: bool,
    resource_modified: bool,
}

impl ProcessItem {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            resource: None,
            metacard_modified: false,
            resource_modified: false,
        }
    }

    /// Attaches the record's current content. Does not mark it modified.
    #[must_use]
    pub fn with_resource(mut self, resource: ProcessResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Mutable access to the record. Callers that change it must also call
    /// [`ProcessItem::mark_metacard_modified`]; [`ProcessItem::set_attribute`]
    /// does both.
    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Sets an attribute and marks the record modified.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.record.set(name, value);
        self.metacard_modified = true;
    }

    pub fn mark_metacard_modified(&mut self) {
        self.metacard_modified = true;
    }

    pub fn is_metacard_modified(&self) -> bool {
        self.metacard_modified
    }

    pub fn resource(&self) -> Option<&ProcessResource> {
        self.resource.as_ref()
    }

    /// Replaces the content and marks it modified. The previous resource, if
    /// any, is returned so the caller can see it; the pipeline still closes it.
    pub fn replace_resource(&mut self, resource: ProcessResource) -> Option<ProcessResource> {
        self.resource_modified = true;
        self.resource.replace(resource)
    }

    pub fn mark_resource_modified(&mut self) {
        self.resource_modified = true;
    }

    /// True only when a resource is present and was modified.
    pub fn is_resource_modified(&self) -> bool {
        self.resource.is_some() && self.resource_modified
    }

    pub fn into_parts(self) -> (Record, Option<ProcessResource>) {
        (self.record, self.resource)
    }
}

/// An ordered set of items of one operation kind plus shared request
/// properties (transaction ids and the like).
#[derive(Debug, Clone)]
pub struct ProcessBatch {
    kind: OperationKind,
    items: Vec<ProcessItem>,
    properties: BTreeMap<String, serde_json::Value>,
}

impl ProcessBatch {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_items(kind: OperationKind, items: Vec<ProcessItem>) -> Self {
        Self {
            kind,
            items,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn push(&mut self, item: ProcessItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[ProcessItem] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [ProcessItem] {
        &mut self.items
    }

    pub fn into_items(self) -> Vec<ProcessItem> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn properties(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Every resource currently attached to an item.
    pub fn resources(&self) -> impl Iterator<Item = &ProcessResource> {
        self.items.iter().filter_map(ProcessItem::resource)
    }
}
