//! Wrapper lifecycle management and downstream effects.
//!
//! Operators report overlay groups through the [`OverlayManager`] trait; the
//! concrete [`TopologyManager`] folds those reports into wrapper state,
//! writes wrappers through the sink, and triggers RPC republication.

pub mod rpc;
pub mod sink;

use crate::model::identifier::IdentifierGenerator;
use crate::model::item::{CorrelationKind, OverlayItem};
use crate::model::wrapper::OverlayItemWrapper;
use rpc::{RpcIdentifier, RpcRegistrar, RpcRepublisher};
use sink::OverlaySink;

/// Downstream interface every correlation operator reports into.
///
/// All three calls are infallible toward the caller: wrapper bookkeeping
/// cannot fail, and sink/RPC effects are fire and forget.
pub trait OverlayManager {
    /// A group reached its strategy minimum (or grew while already live).
    fn add_overlay_item(&mut self, item: OverlayItem);
    /// A live group's membership or member payloads changed.
    fn update_overlay_item(&mut self, item: OverlayItem);
    /// A group dissolved.
    fn remove_overlay_item(&mut self, item: OverlayItem);
}

/// Folds overlay-group reports into wrapper state and external effects.
///
/// Node and termination-point groups share one wrapper list; link groups use
/// a separate one. Wrapper ids are generated once and never reused.
pub struct TopologyManager {
    node_wrappers: Vec<OverlayItemWrapper>,
    link_wrappers: Vec<OverlayItemWrapper>,
    ids: IdentifierGenerator,
    sink: Box<dyn OverlaySink>,
    republisher: RpcRepublisher<Box<dyn RpcRegistrar>>,
}

impl TopologyManager {
    /// Creates a manager around its two external collaborators.
    pub fn new(sink: Box<dyn OverlaySink>, registrar: Box<dyn RpcRegistrar>) -> Self {
        TopologyManager {
            node_wrappers: Vec::new(),
            link_wrappers: Vec::new(),
            ids: IdentifierGenerator::new(),
            sink,
            republisher: RpcRepublisher::new(registrar),
        }
    }

    /// Live node/termination-point wrappers, in creation order.
    pub fn node_wrappers(&self) -> &[OverlayItemWrapper] {
        &self.node_wrappers
    }

    /// Live link wrappers, in creation order.
    pub fn link_wrappers(&self) -> &[OverlayItemWrapper] {
        &self.link_wrappers
    }

    /// Feeds one newly-available remote procedure.
    pub fn rpc_available(&mut self, rpc: RpcIdentifier) {
        self.republisher.rpc_available(rpc);
    }

    /// Feeds one withdrawn remote procedure.
    pub fn rpc_unavailable(&mut self, rpc: &RpcIdentifier) {
        self.republisher.rpc_unavailable(rpc);
    }
}

impl OverlayManager for TopologyManager {
    fn add_overlay_item(&mut self, item: OverlayItem) {
        let kind = item.kind;
        let list = match kind {
            CorrelationKind::Link => &mut self.link_wrappers,
            _ => &mut self.node_wrappers,
        };
        let pos = list.iter().position(|w| {
            item.members.iter().any(|m| w.contains_underlay(&m.item_id))
        });
        match pos {
            Some(pos) => {
                list[pos].add_item(item.clone());
                self.sink.write_item(&list[pos], kind);
                self.republisher.register_rpcs(&list[pos], &item);
            }
            None => {
                let id = self.ids.next_overlay_id(kind);
                let wrapper = OverlayItemWrapper::new(id, item.clone());
                self.sink.write_item(&wrapper, kind);
                self.republisher.register_rpcs(&wrapper, &item);
                list.push(wrapper);
            }
        }
    }

    fn update_overlay_item(&mut self, item: OverlayItem) {
        let kind = item.kind;
        let list = match kind {
            CorrelationKind::Link => &mut self.link_wrappers,
            _ => &mut self.node_wrappers,
        };
        let Some(pos) = list
            .iter()
            .position(|w| w.items().iter().any(|i| i.id() == item.id()))
        else {
            log::debug!("no wrapper holds group {:?}; nothing to update", item.id());
            return;
        };
        list[pos].replace_item(item.clone());
        self.sink.write_item(&list[pos], kind);
        self.republisher.register_rpcs(&list[pos], &item);
    }

    fn remove_overlay_item(&mut self, item: OverlayItem) {
        let kind = item.kind;
        let list = match kind {
            CorrelationKind::Link => &mut self.link_wrappers,
            _ => &mut self.node_wrappers,
        };
        let Some(pos) = list
            .iter()
            .position(|w| w.items().iter().any(|i| i.id() == item.id()))
        else {
            log::debug!("no wrapper holds group {:?}; nothing to remove", item.id());
            return;
        };
        list[pos].remove_item(item.id());
        if list[pos].is_empty() {
            let wrapper = list.remove(pos);
            self.sink.delete_item(&wrapper, kind);
        } else {
            self.sink.write_item(&list[pos], kind);
        }
    }
}

/// One recorded [`OverlayManager`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagerCall {
    /// `add_overlay_item` was invoked.
    Added(OverlayItem),
    /// `update_overlay_item` was invoked.
    Updated(OverlayItem),
    /// `remove_overlay_item` was invoked.
    Removed(OverlayItem),
}

/// Manager double that records every call, for operator unit tests.
#[derive(Clone, Debug, Default)]
pub struct RecordingManager {
    /// Every call, in arrival order.
    pub calls: Vec<ManagerCall>,
}

impl RecordingManager {
    /// Creates an empty recording manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded `add_overlay_item` calls.
    pub fn added(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ManagerCall::Added(_)))
            .count()
    }

    /// Number of recorded `update_overlay_item` calls.
    pub fn updated(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ManagerCall::Updated(_)))
            .count()
    }

    /// Number of recorded `remove_overlay_item` calls.
    pub fn removed(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, ManagerCall::Removed(_)))
            .count()
    }
}

impl OverlayManager for RecordingManager {
    fn add_overlay_item(&mut self, item: OverlayItem) {
        self.calls.push(ManagerCall::Added(item));
    }

    fn update_overlay_item(&mut self, item: OverlayItem) {
        self.calls.push(ManagerCall::Updated(item));
    }

    fn remove_overlay_item(&mut self, item: OverlayItem) {
        self.calls.push(ManagerCall::Removed(item));
    }
}

#[cfg(test)]
mod tests {
    use super::rpc::NullRegistrar;
    use super::sink::{RecordingSink, SinkEvent};
    use super::*;
    use crate::model::identifier::{ItemId, OverlayId, OverlayItemId, TopologyId};
    use crate::model::item::{CorrelationType, UnderlayItem};

    fn member(topology: &str, id: &str) -> UnderlayItem {
        UnderlayItem::new(
            TopologyId::new(topology),
            ItemId::new(id),
            CorrelationKind::Node,
        )
    }

    fn group(id: u64, members: Vec<UnderlayItem>) -> OverlayItem {
        OverlayItem::new(
            OverlayItemId::new(id),
            CorrelationKind::Node,
            CorrelationType::Aggregation,
            members,
        )
    }

    fn manager_with_sink() -> (TopologyManager, RecordingSink) {
        let sink = RecordingSink::new();
        let manager = TopologyManager::new(Box::new(sink.clone()), Box::new(NullRegistrar));
        (manager, sink)
    }

    #[test]
    fn shared_item_id_merges_into_one_wrapper() {
        let (mut manager, _sink) = manager_with_sink();
        manager.add_overlay_item(group(1, vec![member("t1", "n1")]));
        manager.add_overlay_item(group(2, vec![member("t2", "n1")]));
        assert_eq!(manager.node_wrappers().len(), 1);
        assert_eq!(manager.node_wrappers()[0].items().len(), 2);
    }

    #[test]
    fn disjoint_item_ids_create_separate_wrappers() {
        let (mut manager, _sink) = manager_with_sink();
        manager.add_overlay_item(group(1, vec![member("t1", "n1")]));
        manager.add_overlay_item(group(2, vec![member("t1", "n2")]));
        assert_eq!(manager.node_wrappers().len(), 2);
        let ids: Vec<&str> = manager
            .node_wrappers()
            .iter()
            .map(|w| w.id().as_str())
            .collect();
        assert_eq!(ids, vec!["node:1", "node:2"]);
    }

    #[test]
    fn removing_last_group_deletes_the_wrapper() {
        let (mut manager, sink) = manager_with_sink();
        let events = sink.events();
        manager.add_overlay_item(group(1, vec![member("t1", "n1")]));
        manager.remove_overlay_item(group(1, vec![member("t1", "n1")]));
        assert!(manager.node_wrappers().is_empty());
        assert_eq!(
            events.lock().last().cloned(),
            Some(SinkEvent::Delete {
                wrapper: OverlayId::new("node:1"),
                kind: CorrelationKind::Node,
            })
        );
    }

    #[test]
    fn update_of_unknown_group_is_benign() {
        let (mut manager, sink) = manager_with_sink();
        let events = sink.events();
        manager.update_overlay_item(group(7, vec![member("t1", "n1")]));
        assert!(events.lock().is_empty());
        assert!(manager.node_wrappers().is_empty());
    }

    #[test]
    fn links_use_their_own_wrapper_list() {
        let (mut manager, _sink) = manager_with_sink();
        let link_member = UnderlayItem::new(
            TopologyId::new("t1"),
            ItemId::new("l1"),
            CorrelationKind::Link,
        );
        let link_group = OverlayItem::new(
            OverlayItemId::new(1),
            CorrelationKind::Link,
            CorrelationType::FiltrationOnly,
            vec![link_member],
        );
        manager.add_overlay_item(link_group);
        manager.add_overlay_item(group(2, vec![member("t1", "n1")]));
        assert_eq!(manager.link_wrappers().len(), 1);
        assert_eq!(manager.node_wrappers().len(), 1);
        assert_eq!(manager.link_wrappers()[0].id().as_str(), "link:1");
    }
}
