//! # topo-fuse
//!
//! topo-fuse is a modular Rust library for correlating independent "underlay"
//! network topologies into derived "overlay" views. It ingests incremental
//! change notifications describing nodes, links and termination points and
//! maintains the correlated state through configurable strategies: value
//! equality, unconditional unification, filtration chains and custom
//! scripted predicates.
//!
//! ## Features
//! - Per-topology stores with deterministic scan order and an idempotent
//!   registry per correlation
//! - Aggregation with equality/unification policies and pluggable match
//!   strategies
//! - Filtration chains (value equality, numeric/string ranges, IP prefixes,
//!   scripted predicates), including termination-point narrowing and
//!   pre-aggregation variants
//! - Link endpoint resolution with a waiting list, so nodes and links may
//!   arrive in any order
//! - A two-stream join for entities described by differently-keyed feeds
//! - Wrapper lifecycle management with write-through to an external sink and
//!   RPC republication onto overlay identities
//!
//! ## Determinism
//!
//! Stores iterate in key order and registries in registration order, so the
//! first-match aggregation scan is reproducible run to run. Convergence is
//! independent of arrival order: the waiting-list and cross-reference
//! mechanisms guarantee the same final state for any permutation of a change
//! set.
//!
//! ## Usage
//! Add `topo-fuse` as a dependency in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! topo-fuse = "0.1"
//! ```
//!
//! Assemble a pipeline from a [`config::CorrelationConfig`] with
//! [`config::PipelineBuilder`], then feed it batches through
//! [`config::CorrelationPipeline::process_created`] and friends. One pipeline
//! instance processes one batch at a time; callers without a single-threaded
//! dispatch loop can serialize through
//! [`config::CorrelationPipeline::into_shared`].

// Re-export our major subsystems:
pub mod config;
pub mod fuse_error;
pub mod manager;
pub mod model;
pub mod operator;
pub mod store;

pub use fuse_error::TopoFuseError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::config::{
        ConnectorSpec, CorrelationConfig, CorrelationMode, CorrelationPipeline, FilterSpec,
        PipelineBuilder, ScriptHosts, ScriptSpec, SharedPipeline, TopologySpec,
    };
    pub use crate::fuse_error::TopoFuseError;
    pub use crate::manager::rpc::{RpcIdentifier, RpcRegistrar};
    pub use crate::manager::sink::{ChannelSink, OverlaySink, WriteRequest};
    pub use crate::manager::{OverlayManager, TopologyManager};
    pub use crate::model::identifier::{ItemId, OverlayId, TopologyId, UnderlayKey};
    pub use crate::model::item::{
        CorrelationKind, CorrelationType, ItemPayload, LinkPayload, NodePayload, OverlayItem,
        SupportingNode, TerminationPoint, UnderlayItem,
    };
    pub use crate::model::value::{IpPrefix, LeafValue};
    pub use crate::model::wrapper::OverlayItemWrapper;
    pub use crate::operator::TopologyOperator;
    pub use crate::operator::aggregator::matchers::{LeafEqualityMatcher, PairMatcher};
    pub use crate::operator::aggregator::{AggregationPolicy, TopologyAggregator};
    pub use crate::operator::filtrator::{
        Filtrator, PreAggregationFiltrator, TerminationPointFiltrator, TopologyFiltrator,
    };
    pub use crate::operator::interconnector::NotificationInterConnector;
    pub use crate::operator::link_calculator::LinkCalculator;
    pub use crate::store::{TopoStoreProvider, TopologyStore};
}
