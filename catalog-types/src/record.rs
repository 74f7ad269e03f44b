//! The catalog record.
//!
//! A [`Record`] is an identifier plus a map of named, typed attributes. A few
//! attribute names carry meaning across the workspace (see [`attributes`]):
//! the registry id correlates replicas, and the published-locations and
//! last-published attributes are local bookkeeping stripped by
//! [`Record::to_replica`].

use crate::{DestinationId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Well-known attribute names.
pub mod attributes {
    /// Cross-store correlation key. Stable across every replica of a record.
    pub const REGISTRY_ID: &str = "registry-id";
    /// Destinations currently believed to hold a replica of the record.
    pub const PUBLISHED_LOCATIONS: &str = "published-locations";
    /// When the published set last changed.
    pub const LAST_PUBLISHED: &str = "last-published";
    pub const TITLE: &str = "title";
    pub const MODIFIED: &str = "modified";

    /// Attributes that only describe local bookkeeping and are never sent to
    /// remote stores.
    pub const LOCAL_ONLY: &[&str] = &[PUBLISHED_LOCATIONS, LAST_PUBLISHED];
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
    Binary(Vec<u8>),
    Timestamp(DateTime<Utc>),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Returns the value as a list. A scalar is viewed as a one-element list.
    pub fn as_list(&self) -> Vec<&AttributeValue> {
        match self {
            Self::List(values) => values.iter().collect(),
            other => vec![other],
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(values: Vec<AttributeValue>) -> Self {
        Self::List(values)
    }
}

/// The attributed unit of catalog data (a "metacard").
///
/// Records are plain values: stores hand out copies and plugins mutate their
/// own copy inside a process batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Record {
    /// Creates an empty record with the given id.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Extract a string attribute.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.attributes.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    pub fn registry_id(&self) -> Option<&str> {
        self.get_str(attributes::REGISTRY_ID)
    }

    pub fn set_registry_id(&mut self, registry_id: impl Into<String>) {
        self.set(attributes::REGISTRY_ID, registry_id.into());
    }

    /// Destinations recorded as holding a replica. A missing attribute is an
    /// empty set.
    pub fn published_locations(&self) -> BTreeSet<DestinationId> {
        self.get(attributes::PUBLISHED_LOCATIONS)
            .map(|value| {
                value
                    .as_list()
                    .into_iter()
                    .filter_map(AttributeValue::as_str)
                    .map(DestinationId::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_published_locations<'a>(
        &mut self,
        locations: impl IntoIterator<Item = &'a DestinationId>,
    ) {
        let values: Vec<AttributeValue> = locations
            .into_iter()
            .map(|d| AttributeValue::String(d.to_string()))
            .collect();
        self.set(attributes::PUBLISHED_LOCATIONS, values);
    }

    pub fn last_published(&self) -> Option<DateTime<Utc>> {
        self.get(attributes::LAST_PUBLISHED)
            .and_then(AttributeValue::as_timestamp)
    }

    pub fn set_last_published(&mut self, at: DateTime<Utc>) {
        self.set(attributes::LAST_PUBLISHED, at);
    }

    /// Returns a copy with every local-only attribute removed, suitable for
    /// sending to a remote store.
    #[must_use]
    pub fn to_replica(&self) -> Self {
        let mut replica = self.clone();
        for name in attributes::LOCAL_ONLY {
            replica.attributes.remove(*name);
        }
        replica
    }
}
