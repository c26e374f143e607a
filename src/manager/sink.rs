//! Write-through seam toward the external overlay store.
//!
//! The core enqueues wrapper writes and deletes through [`OverlaySink`] and
//! never waits for completion; retries and failure handling belong to the
//! collaborator behind the seam. [`ChannelSink`] hands requests to an
//! external writer over a FIFO channel; [`NullSink`] and [`RecordingSink`]
//! serve serial unit tests.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::model::identifier::OverlayId;
use crate::model::item::CorrelationKind;
use crate::model::wrapper::OverlayItemWrapper;

/// Fire-and-forget write interface toward the external overlay store.
pub trait OverlaySink {
    /// Writes (creates or replaces) a wrapper.
    fn write_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind);
    /// Deletes a wrapper.
    fn delete_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind);
}

// Blanket impl for Box<T>
impl<T: OverlaySink + ?Sized> OverlaySink for Box<T> {
    #[inline]
    fn write_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        (**self).write_item(wrapper, kind);
    }

    #[inline]
    fn delete_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        (**self).delete_item(wrapper, kind);
    }
}

/// No-op sink for pure serial unit tests.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl OverlaySink for NullSink {
    fn write_item(&mut self, _wrapper: &OverlayItemWrapper, _kind: CorrelationKind) {}
    fn delete_item(&mut self, _wrapper: &OverlayItemWrapper, _kind: CorrelationKind) {}
}

/// One enqueued request toward the external writer.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteRequest {
    /// Create or replace the wrapper.
    Write {
        /// Snapshot of the wrapper at enqueue time.
        wrapper: OverlayItemWrapper,
        /// Wrapper kind (selects the destination list).
        kind: CorrelationKind,
    },
    /// Delete the wrapper.
    Delete {
        /// Snapshot of the wrapper at enqueue time.
        wrapper: OverlayItemWrapper,
        /// Wrapper kind (selects the destination list).
        kind: CorrelationKind,
    },
}

/// Sink that enqueues requests to an external writer over an mpsc channel.
///
/// The channel preserves FIFO order; a disconnected receiver is logged and
/// otherwise ignored, matching the fire-and-forget write model.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: Sender<WriteRequest>,
}

impl ChannelSink {
    /// Wraps the sending half of the writer's channel.
    pub fn new(tx: Sender<WriteRequest>) -> Self {
        ChannelSink { tx }
    }

    fn enqueue(&mut self, request: WriteRequest) {
        if self.tx.send(request).is_err() {
            log::warn!("overlay writer disconnected; dropping write request");
        }
    }
}

impl OverlaySink for ChannelSink {
    fn write_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        self.enqueue(WriteRequest::Write {
            wrapper: wrapper.clone(),
            kind,
        });
    }

    fn delete_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        self.enqueue(WriteRequest::Delete {
            wrapper: wrapper.clone(),
            kind,
        });
    }
}

/// What a [`RecordingSink`] observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// A wrapper write, with the number of overlay groups it carried.
    Write {
        /// Wrapper identity.
        wrapper: OverlayId,
        /// Wrapper kind.
        kind: CorrelationKind,
        /// Number of overlay groups in the wrapper at write time.
        groups: usize,
    },
    /// A wrapper delete.
    Delete {
        /// Wrapper identity.
        wrapper: OverlayId,
        /// Wrapper kind.
        kind: CorrelationKind,
    },
}

/// Sink that records every request for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    /// Creates an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the recorded events.
    pub fn events(&self) -> Arc<Mutex<Vec<SinkEvent>>> {
        Arc::clone(&self.events)
    }
}

impl OverlaySink for RecordingSink {
    fn write_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        self.events.lock().push(SinkEvent::Write {
            wrapper: wrapper.id().clone(),
            kind,
            groups: wrapper.items().len(),
        });
    }

    fn delete_item(&mut self, wrapper: &OverlayItemWrapper, kind: CorrelationKind) {
        self.events.lock().push(SinkEvent::Delete {
            wrapper: wrapper.id().clone(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identifier::{ItemId, OverlayItemId, TopologyId};
    use crate::model::item::{CorrelationType, OverlayItem, UnderlayItem};
    use std::sync::mpsc;

    fn wrapper(id: &str) -> OverlayItemWrapper {
        let member = UnderlayItem::new(
            TopologyId::new("t1"),
            ItemId::new("n1"),
            CorrelationKind::Node,
        );
        OverlayItemWrapper::new(
            OverlayId::new(id),
            OverlayItem::new(
                OverlayItemId::new(1),
                CorrelationKind::Node,
                CorrelationType::FiltrationOnly,
                vec![member],
            ),
        )
    }

    #[test]
    fn channel_sink_preserves_fifo_order() {
        let (tx, rx) = mpsc::channel();
        let mut sink = ChannelSink::new(tx);
        let w = wrapper("node:1");
        sink.write_item(&w, CorrelationKind::Node);
        sink.delete_item(&w, CorrelationKind::Node);
        match rx.recv().unwrap() {
            WriteRequest::Write { wrapper, .. } => assert_eq!(wrapper.id().as_str(), "node:1"),
            other => panic!("expected write first, got {other:?}"),
        }
        assert!(matches!(rx.recv().unwrap(), WriteRequest::Delete { .. }));
    }

    #[test]
    fn channel_sink_survives_disconnected_writer() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        sink.write_item(&wrapper("node:1"), CorrelationKind::Node);
    }

    #[test]
    fn recording_sink_captures_events() {
        let mut sink = RecordingSink::new();
        let events = sink.events();
        sink.write_item(&wrapper("node:1"), CorrelationKind::Node);
        assert_eq!(
            events.lock().as_slice(),
            &[SinkEvent::Write {
                wrapper: OverlayId::new("node:1"),
                kind: CorrelationKind::Node,
                groups: 1,
            }]
        );
    }
}
