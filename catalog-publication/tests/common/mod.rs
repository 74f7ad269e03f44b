#![allow(dead_code)]

use catalog_publication::{DestinationRegistry, PublicationReconciler, ReconcilerConfig};
use catalog_store::{MemoryStore, StoreGateway};
use catalog_types::{DestinationId, Record, RecordId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn dests(ids: &[&str]) -> BTreeSet<DestinationId> {
    ids.iter().map(|s| DestinationId::from(*s)).collect()
}

pub fn record(id: &str, published: &[&str]) -> Record {
    let mut record = Record::new(id).with_attribute("title", format!("record {id}"));
    record.set_registry_id(format!("reg-{id}"));
    if !published.is_empty() {
        record.set_published_locations(&dests(published));
    }
    record
}

/// A local store plus one memory store per destination name.
pub struct Fixture {
    pub local: Arc<MemoryStore>,
    pub remotes: Vec<Arc<MemoryStore>>,
    pub reconciler: PublicationReconciler,
}

impl Fixture {
    pub fn new(destinations: &[&str]) -> Self {
        Self::with_config(destinations, ReconcilerConfig::default())
    }

    pub fn with_config(destinations: &[&str], config: ReconcilerConfig) -> Self {
        init_tracing();
        let local = Arc::new(MemoryStore::new("local"));
        let remotes: Vec<Arc<MemoryStore>> = destinations
            .iter()
            .map(|d| Arc::new(MemoryStore::new(*d)))
            .collect();

        let mut registry = DestinationRegistry::new();
        for remote in &remotes {
            registry.register(remote.clone() as Arc<dyn StoreGateway>);
        }

        let reconciler = PublicationReconciler::with_config(local.clone(), registry, config);
        Self {
            local,
            remotes,
            reconciler,
        }
    }

    pub fn remote(&self, name: &str) -> &Arc<MemoryStore> {
        self.remotes
            .iter()
            .find(|r| r.id().as_str() == name)
            .unwrap_or_else(|| panic!("no remote named {name}"))
    }

    /// Seeds the local store, and each listed remote with a replica.
    pub async fn seed(&self, record: Record) {
        for dest in record.published_locations() {
            if let Some(remote) = self.remotes.iter().find(|r| r.id() == &dest) {
                remote.insert(record.to_replica()).await;
            }
        }
        self.local.insert(record).await;
    }

    /// Writes the outcome's published set back, as the framework does.
    pub async fn persist_published(&self, id: &str, published: &BTreeSet<DestinationId>) {
        let mut record = self.local.record(&RecordId::from(id)).await.unwrap();
        record.set_published_locations(published);
        self.local.insert(record).await;
    }

    pub fn remote_calls(&self) -> usize {
        self.remotes.iter().map(|r| r.total_calls()).sum()
    }
}
