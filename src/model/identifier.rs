//! Strongly-typed identifiers for topology entities.
//!
//! Underlay items are addressed by a `(TopologyId, ItemId)` pair; overlay
//! groups carry an internal [`OverlayItemId`]; wrappers carry the only
//! externally stable identity, [`OverlayId`], generated once and monotonic
//! within a correlation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::item::CorrelationKind;

/// Identifier of one underlay topology (one change-feed source).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopologyId(String);

impl TopologyId {
    /// Wraps a raw topology identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        TopologyId(raw.into())
    }

    /// Returns the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TopologyId").field(&self.0).finish()
    }
}

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TopologyId {
    fn from(raw: &str) -> Self {
        TopologyId::new(raw)
    }
}

/// Identifier of one item (node, link or termination point) within a topology.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Wraps a raw item identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        ItemId(raw.into())
    }

    /// Returns the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemId").field(&self.0).finish()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(raw: &str) -> Self {
        ItemId::new(raw)
    }
}

/// Fully-qualified address of an underlay item across all stores.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnderlayKey {
    /// Topology the item was reported by.
    pub topology_id: TopologyId,
    /// Item identifier within that topology.
    pub item_id: ItemId,
}

impl UnderlayKey {
    /// Builds a key from its parts.
    pub fn new(topology_id: TopologyId, item_id: ItemId) -> Self {
        UnderlayKey {
            topology_id,
            item_id,
        }
    }
}

impl fmt::Display for UnderlayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topology_id, self.item_id)
    }
}

/// Internal identity of one overlay group.
///
/// Used only to locate the group inside its wrapper; it is not a stable
/// external identity (that is [`OverlayId`]).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayItemId(u64);

impl OverlayItemId {
    /// Wraps a raw group counter value.
    pub fn new(raw: u64) -> Self {
        OverlayItemId(raw)
    }

    /// Returns the raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for OverlayItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OverlayItemId").field(&self.0).finish()
    }
}

/// Externally stable identity of an overlay wrapper.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(String);

impl OverlayId {
    /// Wraps a raw overlay identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        OverlayId(raw.into())
    }

    /// Returns the raw identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier source for one correlation.
///
/// Generates wrapper ids (`node:1`, `link:2`, …) and synthesized
/// termination-point ids (`tp:3`). Never reuses a value.
#[derive(Clone, Debug, Default)]
pub struct IdentifierGenerator {
    next: u64,
}

impl IdentifierGenerator {
    /// Creates a generator starting at 1.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    /// Generates the next wrapper id for `kind`.
    ///
    /// Node and termination-point wrappers share the `node:` scheme; link
    /// wrappers use `link:`.
    pub fn next_overlay_id(&mut self, kind: CorrelationKind) -> OverlayId {
        let prefix = match kind {
            CorrelationKind::Link => "link",
            CorrelationKind::Node | CorrelationKind::TerminationPoint => "node",
        };
        OverlayId::new(format!("{prefix}:{}", self.bump()))
    }

    /// Generates the next synthesized termination-point id.
    pub fn next_tp_id(&mut self) -> ItemId {
        ItemId::new(format!("tp:{}", self.bump()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_debug() {
        let t = TopologyId::new("underlay-a");
        assert_eq!(format!("{t}"), "underlay-a");
        assert_eq!(format!("{t:?}"), "TopologyId(\"underlay-a\")");
        let key = UnderlayKey::new(t, ItemId::new("n1"));
        assert_eq!(format!("{key}"), "underlay-a/n1");
    }

    #[test]
    fn generator_is_monotonic_across_kinds() {
        let mut ids = IdentifierGenerator::new();
        assert_eq!(ids.next_overlay_id(CorrelationKind::Node).as_str(), "node:1");
        assert_eq!(ids.next_overlay_id(CorrelationKind::Link).as_str(), "link:2");
        assert_eq!(ids.next_tp_id().as_str(), "tp:3");
        assert_eq!(
            ids.next_overlay_id(CorrelationKind::TerminationPoint).as_str(),
            "node:4"
        );
    }

    #[test]
    fn ordering_and_hash() {
        use std::collections::HashSet;
        let a = ItemId::new("a");
        let b = ItemId::new("b");
        assert!(a < b);
        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b);
        set.insert(a);
        assert_eq!(set.len(), 2);
    }
}
