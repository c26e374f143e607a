//! Filtration stage: drops items failing a predicate chain.
//!
//! Items that pass travel downstream wrapped in singleton overlay groups
//! (correlation type `FiltrationOnly`). A filtrator correlating links lets
//! node items through untouched — links depend on those nodes resolving
//! later. Variants: [`TerminationPointFiltrator`] narrows a node's nested
//! termination points instead of dropping the node;
//! [`PreAggregationFiltrator`] forwards into an aggregator instead of the
//! manager.

pub mod pre_aggregation;
pub mod predicates;
pub mod termination_point;

pub use pre_aggregation::PreAggregationFiltrator;
pub use predicates::{
    Filtrator, IpPrefixFiltrator, NumberRangeFiltrator, StringRangeFiltrator, ValueFiltrator,
};
pub use termination_point::TerminationPointFiltrator;

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, TopologyId};
use crate::model::item::{CorrelationKind, CorrelationType, UnderlayItem};
use crate::operator::TopologyOperator;
use crate::operator::group::GroupTable;
use crate::store::TopoStoreProvider;

/// Applies the predicate chain, honoring the node pass-through rule for
/// link correlations.
pub(crate) fn passed_filtration(
    own_kind: CorrelationKind,
    filtrators: &[Box<dyn Filtrator>],
    item: &UnderlayItem,
) -> Result<bool, TopoFuseError> {
    if own_kind == CorrelationKind::Link && item.kind == CorrelationKind::Node {
        return Ok(true);
    }
    for filtrator in filtrators {
        if !filtrator.passes(&item.leaves)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Plain filtration: passing items go straight to the manager.
pub struct TopologyFiltrator {
    kind: CorrelationKind,
    provider: TopoStoreProvider,
    filtrators: Vec<Box<dyn Filtrator>>,
    groups: GroupTable,
}

impl TopologyFiltrator {
    /// Creates a filtrator for one correlation kind, with no predicates.
    pub fn new(kind: CorrelationKind) -> Self {
        TopologyFiltrator {
            kind,
            provider: TopoStoreProvider::new(),
            filtrators: Vec::new(),
            groups: GroupTable::new(),
        }
    }

    /// Appends a predicate to the chain.
    pub fn add_filtrator(&mut self, filtrator: Box<dyn Filtrator>) {
        self.filtrators.push(filtrator);
    }

    /// Registers a store this filtration reads from. Idempotent.
    pub fn initialize_store(&mut self, topology_id: TopologyId, aggregate_inside: bool) {
        self.provider.initialize_store(topology_id, aggregate_inside);
    }

    /// The filtrator's store registry.
    pub fn provider(&self) -> &TopoStoreProvider {
        &self.provider
    }

    fn admit(
        &mut self,
        mut item: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let gid = self
            .groups
            .create(item.kind, CorrelationType::FiltrationOnly, vec![item.key()]);
        item.attach_to_group(gid);
        self.provider.get_store_mut(topology_id)?.insert(item);
        let snapshot = self.groups.snapshot(gid, &self.provider)?;
        manager.add_overlay_item(snapshot);
        Ok(())
    }

    fn evict(
        &mut self,
        item_id: &ItemId,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let store = self.provider.get_store(topology_id)?;
        let Some(existing) = store.get(item_id) else {
            log::debug!("item {item_id} never passed filtration; removal is a no-op");
            return Ok(());
        };
        match existing.overlay() {
            Some(gid) => {
                let snapshot = self.groups.snapshot(gid, &self.provider)?;
                self.provider.get_store_mut(topology_id)?.remove(item_id);
                self.groups.remove(gid);
                manager.remove_overlay_item(snapshot);
            }
            None => {
                self.provider.get_store_mut(topology_id)?.remove(item_id);
            }
        }
        Ok(())
    }
}

impl TopologyOperator for TopologyFiltrator {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item in created {
            self.provider.get_store(topology_id)?;
            if passed_filtration(self.kind, &self.filtrators, &item)? {
                self.admit(item, topology_id, manager)?;
            } else {
                log::debug!("item {} dropped by filtration", item.key());
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
        for mut item in updated {
            let passes = passed_filtration(self.kind, &self.filtrators, &item)?;
            let store = self.provider.get_store(topology_id)?;
            let previous_group = store.get(&item.item_id).and_then(|i| i.overlay());
            match (previous_group, passes) {
                (Some(gid), true) => {
                    // still passing: refresh the stored copy and re-report
                    item.attach_to_group(gid);
                    self.provider.get_store_mut(topology_id)?.insert(item);
                    let snapshot = self.groups.snapshot(gid, &self.provider)?;
                    manager.update_overlay_item(snapshot);
                }
                (Some(_), false) => {
                    let item_id = item.item_id.clone();
                    self.evict(&item_id, topology_id, manager)?;
                }
                (None, true) => {
                    self.admit(item, topology_id, manager)?;
                }
                (None, false) => {
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
            self.evict(&item_id, topology_id, manager)?;
        }
        Ok(())
    }
}
