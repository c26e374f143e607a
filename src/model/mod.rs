//! Entity model: identifiers, leaf values, underlay/overlay items, wrappers.

pub mod identifier;
pub mod item;
pub mod value;
pub mod wrapper;

pub use identifier::{
    IdentifierGenerator, ItemId, OverlayId, OverlayItemId, TopologyId, UnderlayKey,
};
pub use item::{
    CorrelationKind, CorrelationType, ItemPayload, LinkPayload, NodePayload, OverlayItem,
    SupportingNode, TerminationPoint, UnderlayItem,
};
pub use value::{IpPrefix, LeafValue};
pub use wrapper::OverlayItemWrapper;
