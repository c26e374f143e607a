//! Correlation operators: the stages a change batch flows through.
//!
//! Every stage implements [`TopologyOperator`]; stages compose by holding
//! the next stage (connector → filtrator → aggregator) or by reporting
//! straight into the manager. One batch is processed fully synchronously;
//! the manager handle is passed into every call rather than stored, so the
//! whole pipeline shares a single downstream without interior mutability.

pub(crate) mod group;

pub mod aggregator;
pub mod filtrator;
pub mod interconnector;
pub mod link_calculator;

use crate::fuse_error::TopoFuseError;
use crate::manager::OverlayManager;
use crate::model::identifier::{ItemId, TopologyId};
use crate::model::item::UnderlayItem;

/// One stage of a correlation pipeline.
pub trait TopologyOperator {
    /// Processes a batch of newly-created underlay items from one topology.
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError>;

    /// Processes a batch of updated underlay items from one topology.
    fn process_updated_changes(
        &mut self,
        updated: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError>;

    /// Processes a batch of removed item identifiers from one topology.
    fn process_removed_changes(
        &mut self,
        removed: Vec<ItemId>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError>;
}

// Blanket impl for Box<T>
impl<T: TopologyOperator + ?Sized> TopologyOperator for Box<T> {
    #[inline]
    fn process_created_changes(
        &mut self,
        created: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        (**self).process_created_changes(created, topology_id, manager)
    }

    #[inline]
    fn process_updated_changes(
        &mut self,
        updated: Vec<UnderlayItem>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        (**self).process_updated_changes(updated, topology_id, manager)
    }

    #[inline]
    fn process_removed_changes(
        &mut self,
        removed: Vec<ItemId>,
        topology_id: &TopologyId,
        manager: &mut dyn OverlayManager,
    ) -> Result<(), TopoFuseError> {
        (**self).process_removed_changes(removed, topology_id, manager)
    }
}
