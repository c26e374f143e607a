//! Aggregation stage: groups underlay items describing the same entity.
//!
//! For each created item the aggregator scans every registered store — in
//! registration order, then per-store key order — for the first candidate
//! the match strategy accepts, and either starts a new overlay group with it
//! or joins the candidate's existing group. The first match wins; no further
//! candidates are considered.

pub mod matchers;

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, OverlayItemId, TopologyId, UnderlayKey};
use crate::model::item::{CorrelationType, UnderlayItem};
use crate::operator::TopologyOperator;
use crate::operator::group::GroupTable;
use crate::store::TopoStoreProvider;
use matchers::{LeafEqualityMatcher, PairMatcher};

/// Minimum-group-size policy of an aggregation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// Groups exist only once two items agree; unmatched items wait.
    Equality,
    /// Every item gets a group immediately; singletons are legal.
    Unification,
}

impl AggregationPolicy {
    /// Smallest membership a live group may have.
    pub fn min_members(self) -> usize {
        match self {
            AggregationPolicy::Equality => 2,
            AggregationPolicy::Unification => 1,
        }
    }

    fn correlation(self) -> CorrelationType {
        match self {
            AggregationPolicy::Equality => CorrelationType::Aggregation,
            AggregationPolicy::Unification => CorrelationType::Unification,
        }
    }
}

/// Groups underlay items across stores under a configurable match strategy.
pub struct TopologyAggregator {
    provider: TopoStoreProvider,
    policy: AggregationPolicy,
    matcher: Box<dyn PairMatcher>,
    groups: GroupTable,
}

impl TopologyAggregator {
    /// Creates an aggregator with the default leaf-equality strategy.
    pub fn new(policy: AggregationPolicy) -> Self {
        Self::with_matcher(policy, Box::new(LeafEqualityMatcher))
    }

    /// Creates an aggregator with an injected match strategy.
    pub fn with_matcher(policy: AggregationPolicy, matcher: Box<dyn PairMatcher>) -> Self {
        TopologyAggregator {
            provider: TopoStoreProvider::new(),
            policy,
            matcher,
            groups: GroupTable::new(),
        }
    }

    /// Registers a store this aggregation scans. Idempotent.
    pub fn initialize_store(&mut self, topology_id: TopologyId, aggregate_inside: bool) {
        self.provider.initialize_store(topology_id, aggregate_inside);
    }

    /// The aggregator's store registry.
    pub fn provider(&self) -> &TopoStoreProvider {
        &self.provider
    }

    /// Number of live overlay groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// First candidate accepted by the matcher, in store-registration then
    /// per-store key order.
    fn find_match(
        &self,
        item: &UnderlayItem,
        topology_id: &TopologyId,
    ) -> Result<Option<UnderlayKey>, TopoFuseError> {
        for store in self.provider.stores() {
            if store.topology_id() == topology_id && !store.aggregate_inside() {
                continue;
            }
            for (_, candidate) in store.iter() {
                if candidate.key() == item.key() || candidate.leaves.is_empty() {
                    continue;
                }
                if self.matcher.matches(candidate, item)? {
                    return Ok(Some(candidate.key()));
                }
            }
        }
        Ok(None)
    }

    fn process_created_item(
        &mut self,
        mut item: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        self.provider.get_store(topology_id)?;
        if item.leaves.is_empty() {
            log::debug!(
                "item {} carries no correlation leaves; stored unmatched",
                item.key()
            );
            self.provider.get_store_mut(topology_id)?.insert(item);
            return Ok(());
        }
        let matched = self.find_match(&item, topology_id)?;
        match matched {
            Some(candidate_key) => {
                let candidate_group = self
                    .provider
                    .get_store(&candidate_key.topology_id)?
                    .get(&candidate_key.item_id)
                    .and_then(|c| c.overlay());
                match candidate_group {
                    Some(gid) => {
                        // join the candidate's existing group
                        item.attach_to_group(gid);
                        self.groups.append(gid, item.key());
                        self.provider.get_store_mut(topology_id)?.insert(item);
                        let snapshot = self.groups.snapshot(gid, &self.provider)?;
                        manager.update_overlay_item(snapshot);
                    }
                    None => {
                        // start a new group: the new item, then the match
                        let gid = self.groups.create(
                            item.kind,
                            self.policy.correlation(),
                            vec![item.key(), candidate_key.clone()],
                        );
                        item.attach_to_group(gid);
                        self.provider.get_store_mut(topology_id)?.insert(item);
                        let candidate_store =
                            self.provider.get_store_mut(&candidate_key.topology_id)?;
                        if let Some(candidate) = candidate_store.get_mut(&candidate_key.item_id) {
                            candidate.attach_to_group(gid);
                        }
                        let snapshot = self.groups.snapshot(gid, &self.provider)?;
                        manager.add_overlay_item(snapshot);
                    }
                }
            }
            None => {
                if self.policy.min_members() <= 1 {
                    let gid =
                        self.groups
                            .create(item.kind, self.policy.correlation(), vec![item.key()]);
                    item.attach_to_group(gid);
                    self.provider.get_store_mut(topology_id)?.insert(item);
                    let snapshot = self.groups.snapshot(gid, &self.provider)?;
                    manager.add_overlay_item(snapshot);
                } else {
                    self.provider.get_store_mut(topology_id)?.insert(item);
                }
            }
        }
        Ok(())
    }

    fn process_updated_item(
        &mut self,
        updated: UnderlayItem,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let store = self.provider.get_store_mut(topology_id)?;
        let Some(existing) = store.get_mut(&updated.item_id) else {
            return Err(TopoFuseError::MissingUnderlayItem {
                topology: topology_id.clone(),
                item: updated.item_id.clone(),
            });
        };
        if existing.leaves == updated.leaves {
            // match-relevant state unchanged: refresh the payload in place
            existing.payload = updated.payload;
            let group = existing.overlay();
            if let Some(gid) = group {
                let snapshot = self.groups.snapshot(gid, &self.provider)?;
                manager.update_overlay_item(snapshot);
            }
            Ok(())
        } else {
            let key = existing.key();
            let group = existing.detach_from_group();
            if let Some(gid) = group {
                self.detach_member(gid, &key, manager)?;
            }
            self.provider
                .get_store_mut(topology_id)?
                .remove(&updated.item_id);
            self.process_created_item(updated, topology_id, manager)
        }
    }

    fn process_removed_item(
        &mut self,
        item_id: &ItemId,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let store = self.provider.get_store_mut(topology_id)?;
        let Some(mut removed) = store.remove(item_id) else {
            return Err(TopoFuseError::MissingUnderlayItem {
                topology: topology_id.clone(),
                item: item_id.clone(),
            });
        };
        if let Some(gid) = removed.detach_from_group() {
            self.detach_member(gid, &removed.key(), manager)?;
        }
        Ok(())
    }

    /// Drops one member from a group, dissolving it when membership falls
    /// below the policy minimum. Remaining members of a dissolved group are
    /// unlinked in their stores and reported removed as a set.
    fn detach_member(
        &mut self,
        gid: OverlayItemId,
        removed: &UnderlayKey,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        let remaining = self.groups.remove_member(gid, removed);
        if remaining < self.policy.min_members() {
            let snapshot = self.groups.snapshot(gid, &self.provider)?;
            let members: Vec<UnderlayKey> = self
                .groups
                .get(gid)
                .map(|g| g.members.clone())
                .unwrap_or_default();
            for key in members {
                let store = self.provider.get_store_mut(&key.topology_id)?;
                if let Some(member) = store.get_mut(&key.item_id) {
                    member.detach_from_group();
                }
            }
            self.groups.remove(gid);
            log::debug!("group {gid:?} fell below minimum; dissolved");
            manager.remove_overlay_item(snapshot);
        } else {
            let snapshot = self.groups.snapshot(gid, &self.provider)?;
            manager.update_overlay_item(snapshot);
        }
        Ok(())
    }
}

impl TopologyOperator for TopologyAggregator {
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        for item in created {
            self.process_created_item(item, topology_id, manager)?;
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
            self.process_updated_item(item, topology_id, manager)?;
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
            self.process_removed_item(&item_id, topology_id, manager)?;
        }
        Ok(())
    }
}
