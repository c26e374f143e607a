//! Underlay and overlay item types.
//!
//! An [`UnderlayItem`] is one entity as reported by one underlay topology;
//! an [`OverlayItem`] is an ordered group of underlay items a correlation
//! operator decided describe the same real-world entity. Canonical underlay
//! items live in their [`TopologyStore`](crate::store::TopologyStore);
//! overlay items flowing to the manager carry member snapshots by value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::identifier::{ItemId, OverlayItemId, TopologyId, UnderlayKey};
use crate::model::value::LeafValue;

/// The entity kind a correlation operates on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationKind {
    /// Topology nodes.
    Node,
    /// Topology links.
    Link,
    /// Termination points nested under nodes.
    TerminationPoint,
}

/// Marks which correlation produced an overlay group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CorrelationType {
    /// Equality aggregation (groups of two or more).
    Aggregation,
    /// Unification aggregation (singletons allowed).
    Unification,
    /// Filtration without aggregation; groups are always singletons.
    FiltrationOnly,
}

/// Back-reference from an overlay node to an underlay node it was built from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingNode {
    /// Topology the supporting node lives in.
    pub topology_id: TopologyId,
    /// Supporting node id within that topology.
    pub node_id: ItemId,
}

/// One termination point nested under a node payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerminationPoint {
    /// Termination-point id, native or synthesized.
    pub tp_id: ItemId,
    /// References back to the source model's termination points.
    pub tp_refs: Vec<ItemId>,
    /// Leaf values used by termination-point filtration.
    pub leaves: BTreeMap<String, LeafValue>,
}

impl TerminationPoint {
    /// Builds a termination point with its native id and no references.
    pub fn new(tp_id: ItemId) -> Self {
        TerminationPoint {
            tp_id,
            tp_refs: Vec::new(),
            leaves: BTreeMap::new(),
        }
    }

    /// Adds a leaf value, builder style.
    pub fn with_leaf(mut self, name: impl Into<String>, value: LeafValue) -> Self {
        self.leaves.insert(name.into(), value);
        self
    }
}

/// Structured payload of a node item.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePayload {
    /// Underlay nodes this node was built from.
    pub supporting_nodes: Vec<SupportingNode>,
    /// Nested termination points.
    pub termination_points: Vec<TerminationPoint>,
    /// Remaining attributes, carried opaquely.
    pub attributes: Option<serde_json::Value>,
}

/// Structured payload of a link item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    /// Declared source-node reference.
    pub source: ItemId,
    /// Declared destination-node reference.
    pub dest: ItemId,
}

/// Structured payload of an underlay item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ItemPayload {
    /// Node payload.
    Node(NodePayload),
    /// Link payload.
    Link(LinkPayload),
}

impl ItemPayload {
    /// Returns the node payload, if this is a node.
    pub fn as_node(&self) -> Option<&NodePayload> {
        match self {
            ItemPayload::Node(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the link payload, if this is a link.
    pub fn as_link(&self) -> Option<&LinkPayload> {
        match self {
            ItemPayload::Link(l) => Some(l),
            _ => None,
        }
    }
}

/// One entity as reported by one underlay topology.
///
/// The payload may be absent when only correlation leaves are known (the
/// other half of a joined stream has not arrived yet). The overlay
/// back-reference is maintained by the owning operator; an item belongs to
/// at most one overlay group at a time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnderlayItem {
    /// Topology that reported the item.
    pub topology_id: TopologyId,
    /// Item id within that topology.
    pub item_id: ItemId,
    /// Entity kind.
    pub kind: CorrelationKind,
    /// Structured payload, absent when only leaves are known.
    pub payload: Option<ItemPayload>,
    /// Named leaf values used purely for matching.
    pub leaves: BTreeMap<String, LeafValue>,
    overlay: Option<OverlayItemId>,
}

impl UnderlayItem {
    /// Builds an item with no payload and no leaves.
    pub fn new(topology_id: TopologyId, item_id: ItemId, kind: CorrelationKind) -> Self {
        UnderlayItem {
            topology_id,
            item_id,
            kind,
            payload: None,
            leaves: BTreeMap::new(),
            overlay: None,
        }
    }

    /// Sets the payload, builder style.
    pub fn with_payload(mut self, payload: ItemPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a correlation leaf, builder style.
    pub fn with_leaf(mut self, name: impl Into<String>, value: LeafValue) -> Self {
        self.leaves.insert(name.into(), value);
        self
    }

    /// Returns the item's fully-qualified key.
    pub fn key(&self) -> UnderlayKey {
        UnderlayKey::new(self.topology_id.clone(), self.item_id.clone())
    }

    /// Returns the overlay group this item currently belongs to.
    pub fn overlay(&self) -> Option<OverlayItemId> {
        self.overlay
    }

    pub(crate) fn attach_to_group(&mut self, group: OverlayItemId) {
        debug_assert!(
            self.overlay.is_none() || self.overlay == Some(group),
            "underlay item {} already belongs to {:?}",
            self.key(),
            self.overlay
        );
        self.overlay = Some(group);
    }

    pub(crate) fn detach_from_group(&mut self) -> Option<OverlayItemId> {
        self.overlay.take()
    }
}

/// An ordered group of underlay items considered equivalent.
///
/// Members are snapshots of the canonical store entries, refreshed whenever
/// the owning operator reports the group downstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayItem {
    id: OverlayItemId,
    /// Entity kind of every member.
    pub kind: CorrelationKind,
    /// Which correlation produced the group.
    pub correlation: CorrelationType,
    /// Member snapshots, in group order.
    pub members: Vec<UnderlayItem>,
}

impl OverlayItem {
    /// Builds a group from its identity and members.
    pub fn new(
        id: OverlayItemId,
        kind: CorrelationKind,
        correlation: CorrelationType,
        members: Vec<UnderlayItem>,
    ) -> Self {
        OverlayItem {
            id,
            kind,
            correlation,
            members,
        }
    }

    /// Returns the group's internal identity.
    pub fn id(&self) -> OverlayItemId {
        self.id
    }

    /// Returns true when any member has the given item id.
    pub fn contains_item_id(&self, item_id: &ItemId) -> bool {
        self.members.iter().any(|m| m.item_id == *item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(topology: &str, id: &str) -> UnderlayItem {
        UnderlayItem::new(
            TopologyId::new(topology),
            ItemId::new(id),
            CorrelationKind::Node,
        )
    }

    #[test]
    fn attach_and_detach_group() {
        let mut item = node("t1", "n1");
        assert_eq!(item.overlay(), None);
        item.attach_to_group(OverlayItemId::new(4));
        assert_eq!(item.overlay(), Some(OverlayItemId::new(4)));
        assert_eq!(item.detach_from_group(), Some(OverlayItemId::new(4)));
        assert_eq!(item.overlay(), None);
    }

    #[test]
    fn overlay_item_member_lookup() {
        let group = OverlayItem::new(
            OverlayItemId::new(1),
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![node("t1", "n1"), node("t2", "n1")],
        );
        assert!(group.contains_item_id(&ItemId::new("n1")));
        assert!(!group.contains_item_id(&ItemId::new("n2")));
    }

    #[test]
    fn builder_style_leaves() {
        let item = node("t1", "n1").with_leaf("ip", LeafValue::from("192.168.1.1"));
        assert_eq!(
            item.leaves.get("ip").and_then(LeafValue::as_text),
            Some("192.168.1.1")
        );
    }
}
