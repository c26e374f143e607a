//! Overlay group bookkeeping shared by the correlation operators.

use std::collections::BTreeMap;

use crate::fuse_error::TopoFuseError;
use crate::model::identifier::{OverlayItemId, UnderlayKey};
use crate::model::item::{CorrelationKind, CorrelationType, OverlayItem};
use crate::store::TopoStoreProvider;

/// Canonical state of one overlay group: member keys only.
///
/// Member payloads stay in the topology stores; [`GroupTable::snapshot`]
/// materializes the group with fresh member copies whenever it is reported
/// downstream.
#[derive(Clone, Debug)]
pub(crate) struct GroupState {
    pub kind: CorrelationKind,
    pub correlation: CorrelationType,
    pub members: Vec<UnderlayKey>,
}

/// Group registry of one operator, with its own monotonic id source.
#[derive(Clone, Debug, Default)]
pub(crate) struct GroupTable {
    groups: BTreeMap<OverlayItemId, GroupState>,
    next: u64,
}

impl GroupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a group and returns its identity.
    pub fn create(
        &mut self,
        kind: CorrelationKind,
        correlation: CorrelationType,
        members: Vec<UnderlayKey>,
    ) -> OverlayItemId {
        self.next += 1;
        let id = OverlayItemId::new(self.next);
        self.groups.insert(
            id,
            GroupState {
                kind,
                correlation,
                members,
            },
        );
        id
    }

    pub fn get(&self, id: OverlayItemId) -> Option<&GroupState> {
        self.groups.get(&id)
    }

    /// Appends a member to an existing group.
    pub fn append(&mut self, id: OverlayItemId, key: UnderlayKey) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.members.push(key);
        }
    }

    /// Drops one member, returning the remaining member count.
    pub fn remove_member(&mut self, id: OverlayItemId, key: &UnderlayKey) -> usize {
        match self.groups.get_mut(&id) {
            Some(group) => {
                group.members.retain(|k| k != key);
                group.members.len()
            }
            None => 0,
        }
    }

    /// Deletes a group outright.
    pub fn remove(&mut self, id: OverlayItemId) -> Option<GroupState> {
        self.groups.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Materializes a group with fresh member snapshots from the stores.
    ///
    /// Every member key must resolve; a dangling key means store and group
    /// state diverged.
    pub fn snapshot(
        &self,
        id: OverlayItemId,
        provider: &TopoStoreProvider,
    ) -> Result<OverlayItem, TopoFuseError> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| TopoFuseError::InvalidConfiguration(format!("unknown group {id:?}")))?;
        let mut members = Vec::with_capacity(group.members.len());
        for key in &group.members {
            let item = provider
                .get_store(&key.topology_id)?
                .get(&key.item_id)
                .ok_or_else(|| TopoFuseError::MissingUnderlayItem {
                    topology: key.topology_id.clone(),
                    item: key.item_id.clone(),
                })?;
            members.push(item.clone());
        }
        Ok(OverlayItem::new(id, group.kind, group.correlation, members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identifier::{ItemId, TopologyId};
    use crate::model::item::UnderlayItem;

    fn provider_with(items: &[(&str, &str)]) -> TopoStoreProvider {
        let mut provider = TopoStoreProvider::new();
        for (topology, item) in items {
            let tid = TopologyId::new(*topology);
            provider.initialize_store(tid.clone(), false);
            provider
                .get_store_mut(&tid)
                .unwrap()
                .insert(UnderlayItem::new(
                    tid.clone(),
                    ItemId::new(*item),
                    CorrelationKind::Node,
                ));
        }
        provider
    }

    fn key(topology: &str, item: &str) -> UnderlayKey {
        UnderlayKey::new(TopologyId::new(topology), ItemId::new(item))
    }

    #[test]
    fn snapshot_pulls_fresh_member_copies() {
        let provider = provider_with(&[("t1", "n1"), ("t2", "n1")]);
        let mut groups = GroupTable::new();
        let id = groups.create(
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![key("t1", "n1"), key("t2", "n1")],
        );
        let snapshot = groups.snapshot(id, &provider).unwrap();
        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.id(), id);
    }

    #[test]
    fn snapshot_of_dangling_member_fails() {
        let provider = provider_with(&[("t1", "n1")]);
        let mut groups = GroupTable::new();
        let id = groups.create(
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![key("t1", "gone")],
        );
        assert!(matches!(
            groups.snapshot(id, &provider),
            Err(TopoFuseError::MissingUnderlayItem { .. })
        ));
    }

    #[test]
    fn membership_bookkeeping() {
        let mut groups = GroupTable::new();
        let id = groups.create(
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![key("t1", "n1"), key("t2", "n1")],
        );
        groups.append(id, key("t3", "n1"));
        assert_eq!(groups.remove_member(id, &key("t2", "n1")), 2);
        assert_eq!(groups.get(id).unwrap().members.len(), 2);
        assert!(groups.remove(id).is_some());
        assert_eq!(groups.len(), 0);
    }
}
