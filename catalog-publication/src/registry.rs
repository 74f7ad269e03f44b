use catalog_store::StoreGateway;
use catalog_types::DestinationId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The set of destinations a reconciler can publish to, keyed by id.
///
/// Built once and handed to the reconciler; runtime discovery of stores is
/// the surrounding system's concern.
#[derive(Clone, Default)]
pub struct DestinationRegistry {
    gateways: HashMap<DestinationId, Arc<dyn StoreGateway>>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gateway under its own id, replacing any previous one.
    pub fn register(&mut self, gateway: Arc<dyn StoreGateway>) {
        self.gateways.insert(gateway.id().clone(), gateway);
    }

    #[must_use]
    pub fn with(mut self, gateway: Arc<dyn StoreGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, id: &DestinationId) -> Option<&Arc<dyn StoreGateway>> {
        self.gateways.get(id)
    }

    pub fn contains(&self, id: &DestinationId) -> bool {
        self.gateways.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &DestinationId> {
        self.gateways.keys()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

impl fmt::Debug for DestinationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.gateways.keys().collect();
        ids.sort();
        f.debug_struct("DestinationRegistry")
            .field("destinations", &ids)
            .finish()
    }
}
