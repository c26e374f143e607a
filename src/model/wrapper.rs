//! Externally-addressable wrapper around overlay groups.
//!
//! A wrapper carries the only stable external identity in the system. It
//! holds every overlay group describing the same external node — a node can
//! participate in more than one correlation at a time (node correlation plus
//! termination-point correlation) — and exposes the merged termination-point
//! set across all members.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::model::identifier::{ItemId, OverlayId, OverlayItemId};
use crate::model::item::{ItemPayload, OverlayItem, TerminationPoint};

/// Stable grouping of overlay items describing one external node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayItemWrapper {
    id: OverlayId,
    items: Vec<OverlayItem>,
}

impl OverlayItemWrapper {
    /// Builds a wrapper around its first overlay item.
    pub fn new(id: OverlayId, item: OverlayItem) -> Self {
        OverlayItemWrapper {
            id,
            items: vec![item],
        }
    }

    /// Returns the wrapper's stable identity.
    pub fn id(&self) -> &OverlayId {
        &self.id
    }

    /// Returns the wrapped overlay items.
    pub fn items(&self) -> &[OverlayItem] {
        &self.items
    }

    /// Appends another overlay item describing the same external node.
    pub fn add_item(&mut self, item: OverlayItem) {
        self.items.push(item);
    }

    /// Replaces the overlay item with the same identity.
    ///
    /// Returns false when no item with that identity is wrapped.
    pub fn replace_item(&mut self, item: OverlayItem) -> bool {
        match self.items.iter_mut().find(|i| i.id() == item.id()) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Removes the overlay item with the given identity.
    ///
    /// Returns false when no item with that identity is wrapped.
    pub fn remove_item(&mut self, id: OverlayItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id() != id);
        self.items.len() != before
    }

    /// Returns true once the last overlay item was removed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true when any wrapped group contains an underlay item with
    /// the given item id.
    pub fn contains_underlay(&self, item_id: &ItemId) -> bool {
        self.items.iter().any(|i| i.contains_item_id(item_id))
    }

    /// Merged termination-point set across every member of every group.
    ///
    /// Duplicate termination-point ids (the same point reported through two
    /// correlations) appear once, first occurrence wins.
    pub fn termination_points(&self) -> Vec<&TerminationPoint> {
        self.items
            .iter()
            .flat_map(|group| group.members.iter())
            .filter_map(|member| match member.payload.as_ref() {
                Some(ItemPayload::Node(node)) => Some(node.termination_points.iter()),
                _ => None,
            })
            .flatten()
            .unique_by(|tp| tp.tp_id.clone())
            .collect()
    }
}
