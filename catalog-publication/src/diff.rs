use catalog_types::DestinationId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The operations needed to move from the current to the desired set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationDiff {
    pub to_create: BTreeSet<DestinationId>,
    pub to_delete: BTreeSet<DestinationId>,
    /// Destinations in both sets. No call is made for these.
    pub unchanged: BTreeSet<DestinationId>,
}

impl PublicationDiff {
    /// True when current and desired already agree.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }

    /// Number of remote operations the diff calls for.
    pub fn operation_count(&self) -> usize {
        self.to_create.len() + self.to_delete.len()
    }
}

/// Computes the create/delete sets from one snapshot of each side.
pub fn diff(current: &BTreeSet<DestinationId>, desired: &BTreeSet<DestinationId>) -> PublicationDiff {
    PublicationDiff {
        to_create: desired.difference(current).cloned().collect(),
        to_delete: current.difference(desired).cloned().collect(),
        unchanged: current.intersection(desired).cloned().collect(),
    }
}
