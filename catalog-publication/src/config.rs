use serde::{Deserialize, Serialize};

/// Configuration for the publication reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Maximum destinations operated on at once. `1` runs them sequentially.
    pub max_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}
