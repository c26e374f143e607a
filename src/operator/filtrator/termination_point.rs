//! Termination-point filtration.
//!
//! Narrows a node's nested termination-point collection to the passing
//! subset instead of dropping the node. When the output model cannot reuse
//! the source model's termination-point identifiers, fresh stable ids are
//! synthesized and the native id is kept as a back-reference.

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{IdentifierGenerator, ItemId, TopologyId};
use crate::model::item::{CorrelationType, ItemPayload, UnderlayItem};
use crate::operator::TopologyOperator;
use crate::operator::filtrator::predicates::Filtrator;
use crate::operator::group::GroupTable;
use crate::store::TopoStoreProvider;

/// Rewrites nested termination points; the owning node always passes.
pub struct TerminationPointFiltrator {
    provider: TopoStoreProvider,
    filtrators: Vec<Box<dyn Filtrator>>,
    groups: GroupTable,
    ids: IdentifierGenerator,
    regenerate_ids: bool,
}

impl TerminationPointFiltrator {
    /// Creates a filtrator; `regenerate_ids` selects synthesized
    /// termination-point identifiers for the output model.
    pub fn new(regenerate_ids: bool) -> Self {
        TerminationPointFiltrator {
            provider: TopoStoreProvider::new(),
            filtrators: Vec::new(),
            groups: GroupTable::new(),
            ids: IdentifierGenerator::new(),
            regenerate_ids,
        }
    }

    /// Appends a predicate applied to each termination point's leaves.
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

    /// Keeps only passing termination points, regenerating ids on demand.
    fn narrow(&mut self, item: &mut UnderlayItem) -> Result<(), TopoFuseError> {
        let Some(ItemPayload::Node(node)) = item.payload.as_mut() else {
            return Ok(());
        };
        let mut kept = Vec::with_capacity(node.termination_points.len());
        'tps: for mut tp in node.termination_points.drain(..) {
            for filtrator in &self.filtrators {
                if !filtrator.passes(&tp.leaves)? {
                    continue 'tps;
                }
            }
            if self.regenerate_ids {
                let native = std::mem::replace(&mut tp.tp_id, self.ids.next_tp_id());
                tp.tp_refs.push(native);
            }
            kept.push(tp);
        }
        node.termination_points = kept;
        Ok(())
    }
}

impl TopologyOperator for TerminationPointFiltrator {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for mut item in created {
            self.provider.get_store(topology_id)?;
            self.narrow(&mut item)?;
            let gid =
                self.groups
                    .create(item.kind, CorrelationType::FiltrationOnly, vec![item.key()]);
            item.attach_to_group(gid);
            self.provider.get_store_mut(topology_id)?.insert(item);
            let snapshot = self.groups.snapshot(gid, &self.provider)?;
            manager.add_overlay_item(snapshot);
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
            let store = self.provider.get_store(topology_id)?;
            let Some(gid) = store.get(&item.item_id).and_then(|i| i.overlay()) else {
                return Err(TopoFuseError::MissingUnderlayItem {
                    topology: topology_id.clone(),
                    item: item.item_id.clone(),
                });
            };
            self.narrow(&mut item)?;
            item.attach_to_group(gid);
            self.provider.get_store_mut(topology_id)?.insert(item);
            let snapshot = self.groups.snapshot(gid, &self.provider)?;
            manager.update_overlay_item(snapshot);
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
            let store = self.provider.get_store(topology_id)?;
            let Some(gid) = store.get(&item_id).and_then(|i| i.overlay()) else {
                return Err(TopoFuseError::MissingUnderlayItem {
                    topology: topology_id.clone(),
                    item: item_id.clone(),
                });
            };
            let snapshot = self.groups.snapshot(gid, &self.provider)?;
            self.provider.get_store_mut(topology_id)?.remove(&item_id);
            self.groups.remove(gid);
            manager.remove_overlay_item(snapshot);
        }
        Ok(())
    }
}
