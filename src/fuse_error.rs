//! TopoFuseError: Unified error type for topo-fuse public APIs
//!
//! This error type is used throughout the topo-fuse library to provide robust,
//! non-panicking error handling for all public APIs.

use crate::model::identifier::{ItemId, TopologyId};
use thiserror::Error;

/// Unified error type for topo-fuse operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopoFuseError {
    /// An operation named a topology for which no store was initialized.
    #[error("no topology store registered for `{0}`")]
    MissingTopologyStore(TopologyId),
    /// An update or removal referenced an item its topology store does not hold.
    #[error("underlay item `{item}` missing from topology store `{topology}`")]
    MissingUnderlayItem {
        /// Topology the caller addressed.
        topology: TopologyId,
        /// Item the caller addressed.
        item: ItemId,
    },
    /// A scripted predicate named a host tag no factory was registered for.
    #[error("unknown scripting host `{0}`")]
    UnknownScriptHost(String),
    /// A script host rejected the script source at construction time.
    #[error("script construction failed for host `{host}`: {message}")]
    InvalidScript {
        /// Host tag the script was addressed to.
        host: String,
        /// Host-reported reason.
        message: String,
    },
    /// An initialized script failed while evaluating a single event.
    #[error("script evaluation failed: {0}")]
    ScriptEvaluation(String),
    /// An IP prefix string could not be parsed as `addr/len`.
    #[error("invalid IP prefix `{0}`")]
    InvalidPrefix(String),
    /// The correlation configuration cannot be assembled into a pipeline.
    #[error("invalid correlation configuration: {0}")]
    InvalidConfiguration(String),
}
