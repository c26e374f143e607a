//! Link endpoint resolution against aggregated overlay nodes.
//!
//! A link references underlay nodes; the overlay only contains merged nodes.
//! Each endpoint resolves by scanning the stored overlay nodes'
//! supporting-node back-references. Links whose endpoints are not both
//! resolvable wait, and every node arrival re-attempts the waiting set, so
//! convergence does not depend on whether nodes or links arrive first.

use std::collections::BTreeMap;

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, OverlayItemId, TopologyId, UnderlayKey};
use crate::model::item::{
    CorrelationKind, CorrelationType, ItemPayload, LinkPayload, OverlayItem, UnderlayItem,
};
use crate::operator::TopologyOperator;
use crate::store::TopoStoreProvider;

/// A link whose both endpoints currently resolve.
#[derive(Clone, Debug)]
struct MatchedLink {
    item: UnderlayItem,
    source: ItemId,
    dest: ItemId,
    group: OverlayItemId,
}

/// Resolves link endpoints against overlay nodes and reports link groups.
pub struct LinkCalculator {
    provider: TopoStoreProvider,
    waiting: BTreeMap<UnderlayKey, UnderlayItem>,
    matched: BTreeMap<UnderlayKey, MatchedLink>,
    next_group: u64,
}

impl Default for LinkCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkCalculator {
    /// Creates a calculator with no node stores.
    pub fn new() -> Self {
        LinkCalculator {
            provider: TopoStoreProvider::new(),
            waiting: BTreeMap::new(),
            matched: BTreeMap::new(),
            next_group: 0,
        }
    }

    /// Registers a node store. Idempotent.
    pub fn initialize_store(&mut self, topology_id: TopologyId) {
        self.provider.initialize_store(topology_id, false);
    }

    /// The calculator's node-store registry.
    pub fn provider(&self) -> &TopoStoreProvider {
        &self.provider
    }

    /// Number of links currently waiting for an endpoint.
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Number of links currently resolved.
    pub fn matched_count(&self) -> usize {
        self.matched.len()
    }

    fn next_group_id(&mut self) -> OverlayItemId {
        self.next_group += 1;
        OverlayItemId::new(self.next_group)
    }

    fn link_group(group: OverlayItemId, item: UnderlayItem) -> OverlayItem {
        OverlayItem::new(
            group,
            CorrelationKind::Link,
            CorrelationType::FiltrationOnly,
            vec![item],
        )
    }

    /// Resolves a declared endpoint to the overlay node supported by it.
    fn resolve_endpoint(&self, target: &ItemId) -> Option<ItemId> {
        for store in self.provider.stores() {
            for (_, node) in store.iter() {
                if let Some(ItemPayload::Node(payload)) = &node.payload {
                    if payload.supporting_nodes.iter().any(|sn| sn.node_id == *target) {
                        return Some(node.item_id.clone());
                    }
                }
            }
        }
        None
    }

    fn declared(item: &UnderlayItem) -> Option<&LinkPayload> {
        item.payload.as_ref().and_then(ItemPayload::as_link)
    }

    /// Attempts to resolve a link, promoting it to `matched` on success.
    fn attempt(
        &mut self,
        key: UnderlayKey,
        item: UnderlayItem,
        manager: &mut dyn OverlayManager,
    ) {
        let resolved = Self::declared(&item).map(|payload| {
            (
                self.resolve_endpoint(&payload.source),
                self.resolve_endpoint(&payload.dest),
            )
        });
        match resolved {
            Some((Some(source), Some(dest))) => {
                let group = self.next_group_id();
                self.matched.insert(
                    key,
                    MatchedLink {
                        item: item.clone(),
                        source,
                        dest,
                        group,
                    },
                );
                manager.add_overlay_item(Self::link_group(group, item));
            }
            Some(_) => {
                self.waiting.insert(key, item);
            }
            None => {
                log::debug!("link {} has no link payload; held waiting", item.key());
                self.waiting.insert(key, item);
            }
        }
    }

    /// Re-attempts every waiting link against the current node set.
    fn retry_waiting(&mut self, manager: &mut dyn OverlayManager) {
        let parked: Vec<UnderlayKey> = self.waiting.keys().cloned().collect();
        for key in parked {
            if let Some(item) = self.waiting.remove(&key) {
                self.attempt(key, item, manager);
            }
        }
    }

    fn process_node_created(
        &mut self,
        item: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        self.provider.get_store_mut(topology_id)?.insert(item);
        self.retry_waiting(manager);
        Ok(())
    }

    fn process_node_updated(
        &mut self,
        item: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let store = self.provider.get_store_mut(topology_id)?;
        if store.get(&item.item_id).is_none() {
            return Err(TopoFuseError::MissingUnderlayItem {
                topology: topology_id.clone(),
                item: item.item_id.clone(),
            });
        }
        store.insert(item);
        self.retry_waiting(manager);
        Ok(())
    }

    fn process_node_removed(
        &mut self,
        item_id: &ItemId,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let store = self.provider.get_store_mut(topology_id)?;
        if store.remove(item_id).is_none() {
            return Err(TopoFuseError::MissingUnderlayItem {
                topology: topology_id.clone(),
                item: item_id.clone(),
            });
        }
        // demote every matched link that resolved through the removed node
        let broken: Vec<UnderlayKey> = self
            .matched
            .iter()
            .filter(|(_, link)| link.source == *item_id || link.dest == *item_id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in broken {
            if let Some(link) = self.matched.remove(&key) {
                self.waiting.insert(key, link.item.clone());
                manager.remove_overlay_item(Self::link_group(link.group, link.item));
            }
        }
        Ok(())
    }

    fn process_link_updated(
        &mut self,
        key: UnderlayKey,
        item: UnderlayItem,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if let Some(old) = self.matched.remove(&key) {
            let endpoints = match (Self::declared(&item), Self::declared(&old.item)) {
                (Some(new_payload), Some(old_payload)) => {
                    // re-resolve only the endpoints whose declared value changed
                    let source = if new_payload.source == old_payload.source {
                        Some(old.source.clone())
                    } else {
                        self.resolve_endpoint(&new_payload.source)
                    };
                    let dest = if new_payload.dest == old_payload.dest {
                        Some(old.dest.clone())
                    } else {
                        self.resolve_endpoint(&new_payload.dest)
                    };
                    source.zip(dest)
                }
                _ => None,
            };
            match endpoints {
                Some((source, dest)) => {
                    self.matched.insert(
                        key,
                        MatchedLink {
                            item: item.clone(),
                            source,
                            dest,
                            group: old.group,
                        },
                    );
                    manager.update_overlay_item(Self::link_group(old.group, item));
                }
                None => {
                    self.waiting.insert(key, item.clone());
                    manager.remove_overlay_item(Self::link_group(old.group, item));
                }
            }
            Ok(())
        } else if self.waiting.remove(&key).is_some() {
            self.attempt(key, item, manager);
            Ok(())
        } else {
            Err(TopoFuseError::MissingUnderlayItem {
                topology: key.topology_id,
                item: key.item_id,
            })
        }
    }

    fn process_link_removed(
        &mut self,
        key: UnderlayKey,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        if let Some(link) = self.matched.remove(&key) {
            manager.remove_overlay_item(Self::link_group(link.group, link.item));
            Ok(())
        } else if self.waiting.remove(&key).is_some() {
            Ok(())
        } else {
            Err(TopoFuseError::MissingUnderlayItem {
                topology: key.topology_id,
                item: key.item_id,
            })
        }
    }
}

impl TopologyOperator for LinkCalculator {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item in created {
            match item.kind {
                CorrelationKind::Link => {
                    let key = UnderlayKey::new(topology_id.clone(), item.item_id.clone());
                    self.attempt(key, item, manager);
                }
                _ => self.process_node_created(item, topology_id, manager)?,
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
            match item.kind {
                CorrelationKind::Link => {
                    let key = UnderlayKey::new(topology_id.clone(), item.item_id.clone());
                    self.process_link_updated(key, item, manager)?;
                }
                _ => self.process_node_updated(item, topology_id, manager)?,
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
            if self.provider.has_store(topology_id) {
                self.process_node_removed(&item_id, topology_id, manager)?;
            } else {
                let key = UnderlayKey::new(topology_id.clone(), item_id);
                self.process_link_removed(key, manager)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::RecordingManager;
    use crate::model::item::{NodePayload, SupportingNode};

    const OVERLAY: &str = "overlay";
    const LINKS: &str = "underlay-links";

    fn overlay_node(id: &str, supports: &[&str]) -> UnderlayItem {
        let payload = NodePayload {
            supporting_nodes: supports
                .iter()
                .map(|s| SupportingNode {
                    topology_id: TopologyId::new("underlay"),
                    node_id: ItemId::new(*s),
                })
                .collect(),
            termination_points: Vec::new(),
            attributes: None,
        };
        UnderlayItem::new(
            TopologyId::new(OVERLAY),
            ItemId::new(id),
            CorrelationKind::Node,
        )
        .with_payload(ItemPayload::Node(payload))
    }

    fn link(id: &str, source: &str, dest: &str) -> UnderlayItem {
        UnderlayItem::new(TopologyId::new(LINKS), ItemId::new(id), CorrelationKind::Link)
            .with_payload(ItemPayload::Link(LinkPayload {
                source: ItemId::new(source),
                dest: ItemId::new(dest),
            }))
    }

    fn calculator() -> LinkCalculator {
        let mut calc = LinkCalculator::new();
        calc.initialize_store(TopologyId::new(OVERLAY));
        calc
    }

    fn feed_node(calc: &mut LinkCalculator, manager: &mut RecordingManager, node: UnderlayItem) {
        calc.process_created_changes(vec![node], &TopologyId::new(OVERLAY), manager)
            .unwrap();
    }

    fn feed_link(calc: &mut LinkCalculator, manager: &mut RecordingManager, l: UnderlayItem) {
        calc.process_created_changes(vec![l], &TopologyId::new(LINKS), manager)
            .unwrap();
    }

    #[test]
    fn link_waits_until_both_endpoints_exist() {
        for link_first in [true, false] {
            let mut calc = calculator();
            let mut manager = RecordingManager::new();
            let events: Vec<Box<dyn Fn(&mut LinkCalculator, &mut RecordingManager)>> = vec![
                Box::new(|c, m| feed_link(c, m, link("l1", "u1", "u2"))),
                Box::new(|c, m| feed_node(c, m, overlay_node("o1", &["u1"]))),
                Box::new(|c, m| feed_node(c, m, overlay_node("o2", &["u2"]))),
            ];
            let order: Vec<usize> = if link_first { vec![0, 1, 2] } else { vec![1, 2, 0] };
            for i in &order[..2] {
                events[*i](&mut calc, &mut manager);
                assert_eq!(manager.added(), 0, "premature match (link_first={link_first})");
            }
            events[order[2]](&mut calc, &mut manager);
            assert_eq!(manager.added(), 1);
            assert_eq!(calc.matched_count(), 1);
            assert_eq!(calc.waiting_count(), 0);
        }
    }

    #[test]
    fn update_to_unresolvable_dest_demotes_and_back() {
        let mut calc = calculator();
        let mut manager = RecordingManager::new();
        feed_node(&mut calc, &mut manager, overlay_node("o1", &["u1"]));
        feed_node(&mut calc, &mut manager, overlay_node("o2", &["u2"]));
        feed_link(&mut calc, &mut manager, link("l1", "u1", "u2"));
        assert_eq!(manager.added(), 1);
        manager.calls.clear();

        calc.process_updated_changes(vec![link("l1", "u1", "ghost")], &TopologyId::new(LINKS), &mut manager)
            .unwrap();
        assert_eq!(manager.removed(), 1);
        assert_eq!(calc.waiting_count(), 1);
        manager.calls.clear();

        calc.process_updated_changes(vec![link("l1", "u1", "u2")], &TopologyId::new(LINKS), &mut manager)
            .unwrap();
        assert_eq!(manager.added(), 1);
        assert_eq!(calc.matched_count(), 1);
    }

    #[test]
    fn matched_update_with_same_endpoints_stays_matched() {
        let mut calc = calculator();
        let mut manager = RecordingManager::new();
        feed_node(&mut calc, &mut manager, overlay_node("o1", &["u1"]));
        feed_node(&mut calc, &mut manager, overlay_node("o2", &["u2"]));
        feed_link(&mut calc, &mut manager, link("l1", "u1", "u2"));
        manager.calls.clear();

        calc.process_updated_changes(vec![link("l1", "u1", "u2")], &TopologyId::new(LINKS), &mut manager)
            .unwrap();
        assert_eq!(manager.updated(), 1);
        assert_eq!(calc.matched_count(), 1);
    }

    #[test]
    fn node_removal_demotes_its_links() {
        let mut calc = calculator();
        let mut manager = RecordingManager::new();
        feed_node(&mut calc, &mut manager, overlay_node("o1", &["u1"]));
        feed_node(&mut calc, &mut manager, overlay_node("o2", &["u2"]));
        feed_link(&mut calc, &mut manager, link("l1", "u1", "u2"));
        manager.calls.clear();

        calc.process_removed_changes(vec![ItemId::new("o2")], &TopologyId::new(OVERLAY), &mut manager)
            .unwrap();
        assert_eq!(manager.removed(), 1);
        assert_eq!(calc.matched_count(), 0);
        assert_eq!(calc.waiting_count(), 1);

        // the node store no longer offers o2, so the link stays parked
        feed_node(&mut calc, &mut manager, overlay_node("o3", &["u9"]));
        assert_eq!(calc.waiting_count(), 1);
    }

    #[test]
    fn link_removal_clears_either_map() {
        let mut calc = calculator();
        let mut manager = RecordingManager::new();
        feed_link(&mut calc, &mut manager, link("l1", "u1", "u2"));
        calc.process_removed_changes(vec![ItemId::new("l1")], &TopologyId::new(LINKS), &mut manager)
            .unwrap();
        assert_eq!(calc.waiting_count(), 0);
        assert!(manager.calls.is_empty());

        let err = calc
            .process_removed_changes(vec![ItemId::new("l1")], &TopologyId::new(LINKS), &mut manager)
            .unwrap_err();
        assert!(matches!(err, TopoFuseError::MissingUnderlayItem { .. }));
    }
}
