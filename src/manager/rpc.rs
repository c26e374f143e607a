//! Re-registration of remote procedures onto overlay identities.
//!
//! Remote procedures arrive keyed by the underlay node entry they were
//! registered against. When a wrapper is written, every available procedure
//! whose context matches one of the group's members is re-registered under
//! the wrapper's overlay identity, so callers can address the merged node.

use std::collections::BTreeSet;

use crate::model::identifier::{OverlayId, UnderlayKey};
use crate::model::item::OverlayItem;
use crate::model::wrapper::OverlayItemWrapper;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One available remote procedure, keyed by its underlay context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RpcIdentifier {
    /// Procedure name.
    pub name: String,
    /// Underlay node entry the procedure was registered against.
    pub context: UnderlayKey,
}

impl RpcIdentifier {
    /// Builds an identifier from its parts.
    pub fn new(name: impl Into<String>, context: UnderlayKey) -> Self {
        RpcIdentifier {
            name: name.into(),
            context,
        }
    }
}

/// Registration seam toward the external RPC infrastructure.
///
/// Fire and forget: registration failures are the collaborator's concern.
pub trait RpcRegistrar {
    /// Registers `name` under the overlay context, delegating to the
    /// implementation registered at the underlay context.
    fn register_rpc(&mut self, name: &str, overlay_context: &OverlayId, underlay: &UnderlayKey);
}

// Blanket impl for Box<T>
impl<T: RpcRegistrar + ?Sized> RpcRegistrar for Box<T> {
    #[inline]
    fn register_rpc(&mut self, name: &str, overlay_context: &OverlayId, underlay: &UnderlayKey) {
        (**self).register_rpc(name, overlay_context, underlay);
    }
}

/// No-op registrar for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NullRegistrar;

impl RpcRegistrar for NullRegistrar {
    fn register_rpc(&mut self, _name: &str, _overlay_context: &OverlayId, _underlay: &UnderlayKey) {}
}

/// Registrar that records every registration for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingRegistrar {
    registrations: Arc<Mutex<Vec<(String, OverlayId, UnderlayKey)>>>,
}

impl RecordingRegistrar {
    /// Creates an empty recording registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the recorded registrations.
    pub fn registrations(&self) -> Arc<Mutex<Vec<(String, OverlayId, UnderlayKey)>>> {
        Arc::clone(&self.registrations)
    }
}

impl RpcRegistrar for RecordingRegistrar {
    fn register_rpc(&mut self, name: &str, overlay_context: &OverlayId, underlay: &UnderlayKey) {
        self.registrations
            .lock()
            .push((name.to_string(), overlay_context.clone(), underlay.clone()));
    }
}

/// Tracks available procedures and republishes them per wrapper write.
#[derive(Debug)]
pub struct RpcRepublisher<R> {
    available: BTreeSet<RpcIdentifier>,
    registrar: R,
}

impl<R: RpcRegistrar> RpcRepublisher<R> {
    /// Creates a republisher around a registrar with no known procedures.
    pub fn new(registrar: R) -> Self {
        RpcRepublisher {
            available: BTreeSet::new(),
            registrar,
        }
    }

    /// Feeds one newly-available procedure.
    pub fn rpc_available(&mut self, rpc: RpcIdentifier) {
        self.available.insert(rpc);
    }

    /// Feeds one withdrawn procedure.
    pub fn rpc_unavailable(&mut self, rpc: &RpcIdentifier) {
        self.available.remove(rpc);
    }

    /// Currently known procedures.
    pub fn available(&self) -> &BTreeSet<RpcIdentifier> {
        &self.available
    }

    /// Re-registers every available procedure of every member of
    /// `overlay_item` under the wrapper's overlay identity.
    pub fn register_rpcs(&mut self, wrapper: &OverlayItemWrapper, overlay_item: &OverlayItem) {
        for member in &overlay_item.members {
            let key = member.key();
            for rpc in self.available.iter().filter(|r| r.context == key) {
                self.registrar.register_rpc(&rpc.name, wrapper.id(), &rpc.context);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identifier::{ItemId, OverlayItemId, TopologyId};
    use crate::model::item::{CorrelationKind, CorrelationType, UnderlayItem};

    fn key(topology: &str, item: &str) -> UnderlayKey {
        UnderlayKey::new(TopologyId::new(topology), ItemId::new(item))
    }

    fn member(topology: &str, item: &str) -> UnderlayItem {
        UnderlayItem::new(
            TopologyId::new(topology),
            ItemId::new(item),
            CorrelationKind::Node,
        )
    }

    #[test]
    fn republishes_only_matching_contexts() {
        let registrar = RecordingRegistrar::new();
        let seen = registrar.registrations();
        let mut republisher = RpcRepublisher::new(registrar);
        republisher.rpc_available(RpcIdentifier::new("ping", key("t1", "n1")));
        republisher.rpc_available(RpcIdentifier::new("trace", key("t1", "n1")));
        republisher.rpc_available(RpcIdentifier::new("ping", key("t2", "other")));

        let group = OverlayItem::new(
            OverlayItemId::new(1),
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![member("t1", "n1")],
        );
        let wrapper = OverlayItemWrapper::new(OverlayId::new("node:1"), group.clone());
        republisher.register_rpcs(&wrapper, &group);

        let recorded = seen.lock();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.iter().all(|(_, overlay, underlay)| {
            overlay.as_str() == "node:1" && *underlay == key("t1", "n1")
        }));
    }

    #[test]
    fn withdrawn_rpcs_are_not_republished() {
        let registrar = RecordingRegistrar::new();
        let seen = registrar.registrations();
        let mut republisher = RpcRepublisher::new(registrar);
        let rpc = RpcIdentifier::new("ping", key("t1", "n1"));
        republisher.rpc_available(rpc.clone());
        republisher.rpc_unavailable(&rpc);

        let group = OverlayItem::new(
            OverlayItemId::new(1),
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            vec![member("t1", "n1")],
        );
        let wrapper = OverlayItemWrapper::new(OverlayId::new("node:1"), group.clone());
        republisher.register_rpcs(&wrapper, &group);
        assert!(seen.lock().is_empty());
    }
}
