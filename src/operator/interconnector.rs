//! Joins two differently-keyed change streams describing one entity.
//!
//! Some overlay entities are described by a primary stream (topology-level
//! objects carrying the payload) and a secondary stream (attribute objects
//! keyed differently, carrying the correlation leaves). The primary half
//! names its secondary counterpart in a configured reference leaf. The
//! connector buffers whichever half arrives first and forwards a single
//! combined item — keyed by the primary key — once both halves are present.
//! Batches for topologies outside the binding pass through untouched.

use std::collections::HashMap;

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, TopologyId};
use crate::model::item::UnderlayItem;
use crate::model::value::LeafValue;
use crate::operator::TopologyOperator;

#[derive(Debug, Default)]
struct Slot {
    primary: Option<UnderlayItem>,
    secondary: Option<UnderlayItem>,
    forwarded: bool,
}

/// Cross-references and merges a primary and a secondary change stream.
pub struct NotificationInterConnector<D> {
    primary_topology: TopologyId,
    secondary_topology: TopologyId,
    ref_leaf: String,
    slots: HashMap<ItemId, Slot>,
    xref: HashMap<ItemId, ItemId>,
    downstream: D,
}

impl<D: TopologyOperator> NotificationInterConnector<D> {
    /// Binds the connector to its topology pair and reference leaf.
    pub fn new(
        primary_topology: TopologyId,
        secondary_topology: TopologyId,
        ref_leaf: impl Into<String>,
        downstream: D,
    ) -> Self {
        NotificationInterConnector {
            primary_topology,
            secondary_topology,
            ref_leaf: ref_leaf.into(),
            slots: HashMap::new(),
            xref: HashMap::new(),
            downstream,
        }
    }

    /// The wrapped downstream operator.
    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    /// Secondary key named by a primary half, when present and textual.
    fn secondary_key_of(&self, item: &UnderlayItem) -> Option<ItemId> {
        item.leaves
            .get(&self.ref_leaf)
            .and_then(LeafValue::as_text)
            .map(ItemId::new)
    }

    /// Builds the combined item: primary key and payload, secondary leaves.
    fn combine(&self, primary: &UnderlayItem, secondary: &UnderlayItem) -> UnderlayItem {
        let mut combined = UnderlayItem::new(
            primary.topology_id.clone(),
            primary.item_id.clone(),
            primary.kind,
        );
        combined.payload = primary.payload.clone();
        combined.leaves = primary
            .leaves
            .iter()
            .filter(|(name, _)| *name != &self.ref_leaf)
            .map(|(name, value)| (name.clone(), value.clone()))
            .chain(secondary.leaves.clone())
            .collect();
        combined
    }

    /// Forwards the combined item when both halves are present.
    fn try_forward(
        &mut self,
        primary_key: &ItemId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let Some(slot) = self.slots.get(primary_key) else {
            return Ok(());
        };
        let (Some(primary), Some(secondary)) = (&slot.primary, &slot.secondary) else {
            return Ok(());
        };
        let combined = self.combine(primary, secondary);
        let first = !slot.forwarded;
        if let Some(slot) = self.slots.get_mut(primary_key) {
            slot.forwarded = true;
        }
        let topology = self.primary_topology.clone();
        if first {
            self.downstream
                .process_created_changes(vec![combined], &topology, manager)
        } else {
            self.downstream
                .process_updated_changes(vec![combined], &topology, manager)
        }
    }

    /// Routes one created/updated half into its slot.
    fn accept(
        &mut self,
        item: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if *topology_id == self.primary_topology {
            let primary_key = item.item_id.clone();
            if let Some(secondary_key) = self.secondary_key_of(&item) {
                // a secondary half buffered under its own key moves home
                if let Some(parked) = self.slots.remove(&secondary_key) {
                    let slot = self.slots.entry(primary_key.clone()).or_default();
                    if slot.secondary.is_none() {
                        slot.secondary = parked.secondary;
                    }
                }
                self.xref.insert(secondary_key, primary_key.clone());
            }
            self.slots.entry(primary_key.clone()).or_default().primary = Some(item);
            self.try_forward(&primary_key, manager)
        } else {
            let secondary_key = item.item_id.clone();
            match self.xref.get(&secondary_key).cloned() {
                Some(primary_key) => {
                    self.slots.entry(primary_key.clone()).or_default().secondary = Some(item);
                    self.try_forward(&primary_key, manager)
                }
                None => {
                    // cross-reference unknown yet: park under the own key
                    self.slots.entry(secondary_key).or_default().secondary = Some(item);
                    Ok(())
                }
            }
        }
    }

    fn remove(
        &mut self,
        item_id: ItemId,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let canonical = if *topology_id == self.secondary_topology {
            match self.xref.remove(&item_id) {
                Some(primary_key) => primary_key,
                None => {
                    // only ever parked under its own key
                    self.slots.remove(&item_id);
                    return Ok(());
                }
            }
        } else {
            self.xref.retain(|_, primary| *primary != item_id);
            item_id
        };
        let forwarded = self
            .slots
            .remove(&canonical)
            .is_some_and(|slot| slot.forwarded);
        if forwarded {
            let topology = self.primary_topology.clone();
            self.downstream
                .process_removed_changes(vec![canonical], &topology, manager)
        } else {
            Ok(())
        }
    }
}

impl<D: TopologyOperator> TopologyOperator for NotificationInterConnector<D> {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if *topology_id != self.primary_topology && *topology_id != self.secondary_topology {
            return self
                .downstream
                .process_created_changes(created, topology_id, manager);
        }
        for item in created {
            self.accept(item, topology_id, manager)?;
        }
        Ok(())
    }

    fn process_updated_changes(
        &mut self,
        updated: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if *topology_id != self.primary_topology && *topology_id != self.secondary_topology {
            return self
                .downstream
                .process_updated_changes(updated, topology_id, manager);
        }
        for item in updated {
            self.accept(item, topology_id, manager)?;
        }
        Ok(())
    }

    fn process_removed_changes(
        &mut self,
        removed: Vec<ItemId>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if *topology_id != self.primary_topology && *topology_id != self.secondary_topology {
            return self
                .downstream
                .process_removed_changes(removed, topology_id, manager);
        }
        for item_id in removed {
            self.remove(item_id, topology_id, manager)?;
        }
        Ok(())
    }
}
