//! Filtration in front of an aggregation.
//!
//! Same pass/fail policy as plain filtration, but passing items feed an
//! aggregator rather than the manager, so an item that stops passing is
//! removed through the aggregation machinery and dissolves any overlay
//! group it was part of.

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, TopologyId};
use crate::model::item::{CorrelationKind, UnderlayItem};
use crate::operator::TopologyOperator;
use crate::operator::aggregator::TopologyAggregator;
use crate::operator::filtrator::passed_filtration;
use crate::operator::filtrator::predicates::Filtrator;
use crate::store::TopoStoreProvider;

/// Filtration stage whose downstream is an aggregator.
pub struct PreAggregationFiltrator {
    kind: CorrelationKind,
    provider: TopoStoreProvider,
    filtrators: Vec<Box<dyn Filtrator>>,
    aggregator: TopologyAggregator,
}

impl PreAggregationFiltrator {
    /// Creates a filtrator in front of `aggregator`.
    pub fn new(kind: CorrelationKind, aggregator: TopologyAggregator) -> Self {
        PreAggregationFiltrator {
            kind,
            provider: TopoStoreProvider::new(),
            filtrators: Vec::new(),
            aggregator,
        }
    }

    /// Appends a predicate to the chain.
    pub fn add_filtrator(&mut self, filtrator: Box<dyn Filtrator>) {
        self.filtrators.push(filtrator);
    }

    /// Registers a store in both the filtration and aggregation layers.
    /// Idempotent.
    pub fn initialize_store(&mut self, topology_id: TopologyId, aggregate_inside: bool) {
        self.provider
            .initialize_store(topology_id.clone(), aggregate_inside);
        self.aggregator
            .initialize_store(topology_id, aggregate_inside);
    }

    /// The downstream aggregator.
    pub fn aggregator(&self) -> &TopologyAggregator {
        &self.aggregator
    }
}

impl TopologyOperator for PreAggregationFiltrator {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item in created {
            self.provider.get_store(topology_id)?;
            if passed_filtration(self.kind, &self.filtrators, &item)? {
                self.provider
                    .get_store_mut(topology_id)?
                    .insert(item.clone());
                self.aggregator
                    .process_created_changes(vec![item], topology_id, manager)?;
            } else {
                log::debug!("item {} dropped before aggregation", item.key());
            }
        }
        Ok(())
    }

    fn process_updated_changes(
        &mut self,
        updated: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item in updated {
            let passes = passed_filtration(self.kind, &self.filtrators, &item)?;
            let previously = self.provider.get_store(topology_id)?.get(&item.item_id).is_some();
            match (previously, passes) {
                (true, true) => {
                    self.provider
                        .get_store_mut(topology_id)?
                        .insert(item.clone());
                    self.aggregator
                        .process_updated_changes(vec![item], topology_id, manager)?;
                }
                (true, false) => {
                    let item_id = item.item_id.clone();
                    self.provider.get_store_mut(topology_id)?.remove(&item_id);
                    self.aggregator
                        .process_removed_changes(vec![item_id], topology_id, manager)?;
                }
                (false, true) => {
                    self.provider
                        .get_store_mut(topology_id)?
                        .insert(item.clone());
                    self.aggregator
                        .process_created_changes(vec![item], topology_id, manager)?;
                }
                (false, false) => {
                    log::debug!("item {} still outside filtration", item.key());
                }
            }
        }
        Ok(())
    }

    fn process_removed_changes(
        &mut self,
        removed: Vec<ItemId>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item_id in removed {
            let was_live = self
                .provider
                .get_store_mut(topology_id)?
                .remove(&item_id)
                .is_some();
            if was_live {
                self.aggregator
                    .process_removed_changes(vec![item_id], topology_id, manager)?;
            } else {
                log::debug!("item {item_id} never passed filtration; removal is a no-op");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RecordingManager;
    use crate::model::value::LeafValue;
    use crate::operator::aggregator::AggregationPolicy;
    use crate::operator::filtrator::predicates::IpPrefixFiltrator;

    fn node(topology: &str, id: &str, ip: &str) -> UnderlayItem {
        UnderlayItem::new(
            TopologyId::new(topology),
            ItemId::new(id),
            CorrelationKind::Node,
        )
        .with_leaf("ip", LeafValue::from(ip))
    }

    fn pipeline() -> PreAggregationFiltrator {
        let aggregator = TopologyAggregator::new(AggregationPolicy::Equality);
        let mut filtrator =
            PreAggregationFiltrator::new(CorrelationKind::Node, aggregator);
        filtrator.add_filtrator(Box::new(IpPrefixFiltrator::new(
            "ip",
            "10.0.0.0/8".parse().unwrap(),
        )));
        filtrator.initialize_store(TopologyId::new("a"), false);
        filtrator.initialize_store(TopologyId::new("b"), false);
        filtrator
    }

    #[test]
    fn only_passing_items_reach_the_aggregator() {
        let mut filtrator = pipeline();
        let mut manager = RecordingManager::new();
        filtrator
            .process_created_changes(vec![node("a", "n1", "10.0.0.1")], &TopologyId::new("a"), &mut manager)
            .unwrap();
        filtrator
            .process_created_changes(vec![node("b", "n2", "172.16.0.1")], &TopologyId::new("b"), &mut manager)
            .unwrap();
        filtrator
            .process_created_changes(vec![node("b", "n3", "10.0.0.1")], &TopologyId::new("b"), &mut manager)
            .unwrap();
        // n2 never reached the aggregator; n1+n3 paired
        assert_eq!(manager.added(), 1);
        assert_eq!(filtrator.aggregator().group_count(), 1);
    }

    #[test]
    fn failing_update_dissolves_the_overlay_group() {
        let mut filtrator = pipeline();
        let mut manager = RecordingManager::new();
        filtrator
            .process_created_changes(vec![node("a", "n1", "10.0.0.1")], &TopologyId::new("a"), &mut manager)
            .unwrap();
        filtrator
            .process_created_changes(vec![node("b", "n2", "10.0.0.1")], &TopologyId::new("b"), &mut manager)
            .unwrap();
        manager.calls.clear();

        filtrator
            .process_updated_changes(vec![node("a", "n1", "192.168.0.1")], &TopologyId::new("a"), &mut manager)
            .unwrap();
        assert_eq!(manager.removed(), 1);
        assert_eq!(filtrator.aggregator().group_count(), 0);
    }

    #[test]
    fn newly_passing_update_enters_aggregation() {
        let mut filtrator = pipeline();
        let mut manager = RecordingManager::new();
        filtrator
            .process_created_changes(vec![node("a", "n1", "192.168.0.1")], &TopologyId::new("a"), &mut manager)
            .unwrap();
        assert_eq!(manager.calls.len(), 0);
        filtrator
            .process_updated_changes(vec![node("a", "n1", "10.0.0.1")], &TopologyId::new("a"), &mut manager)
            .unwrap();
        // stored unmatched in the aggregator, no group yet
        assert_eq!(manager.calls.len(), 0);
        filtrator
            .process_created_changes(vec![node("b", "n2", "10.0.0.1")], &TopologyId::new("b"), &mut manager)
            .unwrap();
        assert_eq!(manager.added(), 1);
    }
}
