use catalog_store::StoreError;
use catalog_types::{DestinationId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A remote operation issued during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicationOp {
    Create,
    Delete,
    Update,
}

impl fmt::Display for PublicationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Update => "update",
        };
        f.write_str(s)
    }
}

/// Why an operation on one destination did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationFailure {
    pub operation: PublicationOp,
    pub reason: String,
    /// Whether the store reported the destination as unavailable. Callers
    /// retry every failure on a later pass regardless.
    pub transient: bool,
}

impl DestinationFailure {
    pub fn new(operation: PublicationOp, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn from_store(operation: PublicationOp, err: &StoreError) -> Self {
        Self {
            operation,
            reason: err.to_string(),
            transient: err.is_transient(),
        }
    }
}

/// Result of one reconciliation run for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub record_id: RecordId,
    /// Destinations now believed to hold the record:
    /// `current − deleted + created`.
    pub published: BTreeSet<DestinationId>,
    pub created: BTreeSet<DestinationId>,
    pub deleted: BTreeSet<DestinationId>,
    pub updated: BTreeSet<DestinationId>,
    pub failures: BTreeMap<DestinationId, DestinationFailure>,
}

impl ReconciliationOutcome {
    pub(crate) fn unchanged(record_id: RecordId, published: BTreeSet<DestinationId>) -> Self {
        Self {
            record_id,
            published,
            created: BTreeSet::new(),
            deleted: BTreeSet::new(),
            updated: BTreeSet::new(),
            failures: BTreeMap::new(),
        }
    }

    /// True when no destination failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// True when the published set differs from the one read at the start.
    pub fn published_changed(&self) -> bool {
        !self.created.is_empty() || !self.deleted.is_empty()
    }

    pub fn failed_destinations(&self) -> impl Iterator<Item = &DestinationId> {
        self.failures.keys()
    }
}
