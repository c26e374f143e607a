//! Per-correlation registry of topology stores.

use crate::fuse_error::TopoFuseError;
use crate::model::identifier::TopologyId;
use crate::store::topology_store::TopologyStore;

/// Registry of the [`TopologyStore`]s one correlation operates over.
///
/// Stores are kept in registration order; match scans iterate them in that
/// order, which is part of the observable first-match semantics.
#[derive(Clone, Debug, Default)]
pub struct TopoStoreProvider {
    stores: Vec<TopologyStore>,
}

impl TopoStoreProvider {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a store for `topology_id`.
    ///
    /// Idempotent: a second call with the same id is a no-op, even when the
    /// `aggregate_inside` flag differs.
    pub fn initialize_store(&mut self, topology_id: TopologyId, aggregate_inside: bool) {
        if self.stores.iter().any(|s| *s.topology_id() == topology_id) {
            return;
        }
        self.stores
            .push(TopologyStore::new(topology_id, aggregate_inside));
    }

    /// Looks up the store for `topology_id`.
    pub fn get_store(&self, topology_id: &TopologyId) -> Result<&TopologyStore, TopoFuseError> {
        self.stores
            .iter()
            .find(|s| s.topology_id() == topology_id)
            .ok_or_else(|| TopoFuseError::MissingTopologyStore(topology_id.clone()))
    }

    /// Looks up the store for `topology_id` mutably.
    pub fn get_store_mut(
        &mut self,
        topology_id: &TopologyId,
    ) -> Result<&mut TopologyStore, TopoFuseError> {
        self.stores
            .iter_mut()
            .find(|s| *s.topology_id() == *topology_id)
            .ok_or_else(|| TopoFuseError::MissingTopologyStore(topology_id.clone()))
    }

    /// True when a store was initialized for `topology_id`.
    pub fn has_store(&self, topology_id: &TopologyId) -> bool {
        self.stores.iter().any(|s| s.topology_id() == topology_id)
    }

    /// All stores, in registration order.
    pub fn stores(&self) -> &[TopologyStore] {
        &self.stores
    }

    /// All stores mutably, in registration order.
    pub fn stores_mut(&mut self) -> &mut [TopologyStore] {
        &mut self.stores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let mut provider = TopoStoreProvider::new();
        provider.initialize_store(TopologyId::new("t1"), false);
        provider.initialize_store(TopologyId::new("t1"), true);
        assert_eq!(provider.stores().len(), 1);
        // first registration wins, including the flag
        assert!(!provider.stores()[0].aggregate_inside());
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut provider = TopoStoreProvider::new();
        provider.initialize_store(TopologyId::new("t2"), false);
        provider.initialize_store(TopologyId::new("t1"), false);
        let ids: Vec<&str> = provider
            .stores()
            .iter()
            .map(|s| s.topology_id().as_str())
            .collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn missing_store_is_an_error() {
        let provider = TopoStoreProvider::new();
        let err = provider.get_store(&TopologyId::new("absent")).unwrap_err();
        assert_eq!(
            err,
            TopoFuseError::MissingTopologyStore(TopologyId::new("absent"))
        );
    }
}
