//! Correlation configuration and pipeline assembly.
//!
//! Configuration arrives as already-parsed, strongly-typed values; this
//! module turns one [`CorrelationConfig`] into a runnable
//! [`CorrelationPipeline`] — connector, filtration, aggregation or link
//! computation, and the manager behind them — failing fast on anything a
//! running pipeline could not recover from (unknown script hosts, invalid
//! prefixes, an empty topology list).

pub mod script;

pub use script::ScriptHosts;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::fuse_error::TopoFuseError;
use crate::manager::rpc::{NullRegistrar, RpcIdentifier, RpcRegistrar};
use crate::manager::sink::{NullSink, OverlaySink};
use crate::manager::TopologyManager;
use crate::model::identifier::{ItemId, TopologyId};
use crate::model::item::{CorrelationKind, UnderlayItem};
use crate::model::value::{IpPrefix, LeafValue};
use crate::operator::aggregator::{AggregationPolicy, TopologyAggregator};
use crate::operator::filtrator::predicates::{
    Filtrator, IpPrefixFiltrator, NumberRangeFiltrator, StringRangeFiltrator, ValueFiltrator,
};
use crate::operator::filtrator::{
    PreAggregationFiltrator, TerminationPointFiltrator, TopologyFiltrator,
};
use crate::operator::interconnector::NotificationInterConnector;
use crate::operator::link_calculator::LinkCalculator;
use crate::operator::TopologyOperator;

/// A scripted predicate: host tag plus script source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    /// Scripting host tag, resolved against [`ScriptHosts`].
    pub host: String,
    /// Script source handed to the host.
    pub source: String,
}

/// One filter predicate of a filtration chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FilterSpec {
    /// The named leaf must equal a value.
    ValueEquality {
        /// Leaf name.
        leaf: String,
        /// Expected value.
        value: LeafValue,
    },
    /// The named numeric leaf must lie in an inclusive range.
    NumberRange {
        /// Leaf name.
        leaf: String,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// The named text leaf must lie in an inclusive lexicographic range.
    StringRange {
        /// Leaf name.
        leaf: String,
        /// Lower bound.
        min: String,
        /// Upper bound.
        max: String,
    },
    /// The named leaf must parse as an address inside a prefix.
    IpPrefix {
        /// Leaf name.
        leaf: String,
        /// Prefix in `addr/len` form.
        prefix: String,
    },
    /// A scripted predicate.
    Script(ScriptSpec),
}

/// One underlay topology a correlation operates over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySpec {
    /// Topology id.
    pub id: TopologyId,
    /// Whether items of this topology may aggregate with each other.
    pub aggregate_inside: bool,
}

/// Binding of a secondary change stream onto a primary one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Topology delivering the primary halves.
    pub primary: TopologyId,
    /// Topology delivering the secondary halves.
    pub secondary: TopologyId,
    /// Leaf on the primary half naming its secondary counterpart.
    pub ref_leaf: String,
}

/// What a correlation does with its items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CorrelationMode {
    /// Aggregate under leaf equality; groups need at least two members.
    EqualityAggregation {
        /// Filtration applied before aggregation.
        filters: Vec<FilterSpec>,
        /// Scripted override of the match predicate.
        matcher: Option<ScriptSpec>,
    },
    /// Aggregate with singleton groups allowed.
    UnificationAggregation {
        /// Filtration applied before aggregation.
        filters: Vec<FilterSpec>,
        /// Scripted override of the match predicate.
        matcher: Option<ScriptSpec>,
    },
    /// Filtration only.
    Filtration {
        /// The predicate chain.
        filters: Vec<FilterSpec>,
    },
    /// Narrow nested termination points instead of dropping nodes.
    TerminationPointFiltration {
        /// The predicate chain, applied per termination point.
        filters: Vec<FilterSpec>,
        /// Synthesize output-model termination-point ids.
        regenerate_ids: bool,
    },
    /// Resolve link endpoints against overlay nodes.
    LinkComputation,
}

/// Full configuration of one correlation pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Entity kind this correlation operates on.
    pub kind: CorrelationKind,
    /// Topologies feeding the correlation.
    pub topologies: Vec<TopologySpec>,
    /// Correlation behavior.
    pub mode: CorrelationMode,
    /// Optional two-stream join in front of the pipeline.
    pub connector: Option<ConnectorSpec>,
}

/// Assembles [`CorrelationPipeline`]s from configuration.
pub struct PipelineBuilder {
    hosts: ScriptHosts,
    sink: Box<dyn OverlaySink>,
    registrar: Box<dyn RpcRegistrar>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a builder with no script hosts and no-op collaborators.
    pub fn new() -> Self {
        PipelineBuilder {
            hosts: ScriptHosts::new(),
            sink: Box::new(NullSink),
            registrar: Box::new(NullRegistrar),
        }
    }

    /// Installs the overlay sink.
    pub fn with_sink(mut self, sink: Box<dyn OverlaySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Installs the RPC registrar.
    pub fn with_registrar(mut self, registrar: Box<dyn RpcRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Installs the scripting-host registry.
    pub fn with_script_hosts(mut self, hosts: ScriptHosts) -> Self {
        self.hosts = hosts;
        self
    }

    fn build_filtrators(
        &self,
        specs: &[FilterSpec],
    ) -> Result<Vec<Box<dyn Filtrator>>, TopoFuseError> {
        let mut filtrators: Vec<Box<dyn Filtrator>> = Vec::with_capacity(specs.len());
        for spec in specs {
            filtrators.push(match spec {
                FilterSpec::ValueEquality { leaf, value } => {
                    Box::new(ValueFiltrator::new(leaf.clone(), value.clone()))
                }
                FilterSpec::NumberRange { leaf, min, max } => {
                    Box::new(NumberRangeFiltrator::new(leaf.clone(), *min, *max))
                }
                FilterSpec::StringRange { leaf, min, max } => Box::new(StringRangeFiltrator::new(
                    leaf.clone(),
                    min.clone(),
                    max.clone(),
                )),
                FilterSpec::IpPrefix { leaf, prefix } => {
                    let prefix: IpPrefix = prefix.parse()?;
                    Box::new(IpPrefixFiltrator::new(leaf.clone(), prefix))
                }
                FilterSpec::Script(script) => {
                    self.hosts.build_filter(&script.host, &script.source)?
                }
            });
        }
        Ok(filtrators)
    }

    fn build_aggregation(
        &self,
        config: &CorrelationConfig,
        policy: AggregationPolicy,
        filters: &[FilterSpec],
        matcher: &Option<ScriptSpec>,
    ) -> Result<Box<dyn TopologyOperator>, TopoFuseError> {
        let mut aggregator = match matcher {
            Some(script) => TopologyAggregator::with_matcher(
                policy,
                self.hosts.build_matcher(&script.host, &script.source)?,
            ),
            None => TopologyAggregator::new(policy),
        };
        if filters.is_empty() {
            for topology in &config.topologies {
                aggregator.initialize_store(topology.id.clone(), topology.aggregate_inside);
            }
            return Ok(Box::new(aggregator));
        }
        let mut filtrator = PreAggregationFiltrator::new(config.kind, aggregator);
        for built in self.build_filtrators(filters)? {
            filtrator.add_filtrator(built);
        }
        for topology in &config.topologies {
            filtrator.initialize_store(topology.id.clone(), topology.aggregate_inside);
        }
        Ok(Box::new(filtrator))
    }

    /// Builds the pipeline for one correlation.
    pub fn build(self, config: CorrelationConfig) -> Result<CorrelationPipeline, TopoFuseError> {
        if config.topologies.is_empty() {
            return Err(TopoFuseError::InvalidConfiguration(
                "a correlation needs at least one topology".to_string(),
            ));
        }
        let mut operator: Box<dyn TopologyOperator> = match &config.mode {
            CorrelationMode::EqualityAggregation { filters, matcher } => {
                self.build_aggregation(&config, AggregationPolicy::Equality, filters, matcher)?
            }
            CorrelationMode::UnificationAggregation { filters, matcher } => {
                self.build_aggregation(&config, AggregationPolicy::Unification, filters, matcher)?
            }
            CorrelationMode::Filtration { filters } => {
                let mut filtrator = TopologyFiltrator::new(config.kind);
                for built in self.build_filtrators(filters)? {
                    filtrator.add_filtrator(built);
                }
                for topology in &config.topologies {
                    filtrator.initialize_store(topology.id.clone(), topology.aggregate_inside);
                }
                Box::new(filtrator)
            }
            CorrelationMode::TerminationPointFiltration {
                filters,
                regenerate_ids,
            } => {
                let mut filtrator = TerminationPointFiltrator::new(*regenerate_ids);
                for built in self.build_filtrators(filters)? {
                    filtrator.add_filtrator(built);
                }
                for topology in &config.topologies {
                    filtrator.initialize_store(topology.id.clone(), topology.aggregate_inside);
                }
                Box::new(filtrator)
            }
            CorrelationMode::LinkComputation => {
                let mut calculator = LinkCalculator::new();
                for topology in &config.topologies {
                    calculator.initialize_store(topology.id.clone());
                }
                Box::new(calculator)
            }
        };
        if let Some(connector) = config.connector {
            operator = Box::new(NotificationInterConnector::new(
                connector.primary,
                connector.secondary,
                connector.ref_leaf,
                operator,
            ));
        }
        Ok(CorrelationPipeline {
            operator,
            manager: TopologyManager::new(self.sink, self.registrar),
        })
    }
}

/// One assembled correlation pipeline: operator chain plus manager.
///
/// A pipeline instance processes one batch at a time, fully synchronously.
/// Callers deliver batches from a single dispatch loop or serialize through
/// [`CorrelationPipeline::into_shared`].
pub struct CorrelationPipeline {
    operator: Box<dyn TopologyOperator>,
    manager: TopologyManager,
}

/// Per-correlation mutex over a pipeline, for callers without a
/// single-threaded dispatch loop.
pub type SharedPipeline = Arc<Mutex<CorrelationPipeline>>;

impl CorrelationPipeline {
    /// Delivers a batch of created items from one topology.
    pub fn process_created(
        &mut self,
        topology_id: &TopologyId,
        created: Vec<UnderlayItem>,
    ) -> Result<(), TopoFuseError> {
        self.operator
            .process_created_changes(created, topology_id, &mut self.manager)
    }

    /// Delivers a batch of updated items from one topology.
    pub fn process_updated(
        &mut self,
        topology_id: &TopologyId,
        updated: Vec<UnderlayItem>,
    ) -> Result<(), TopoFuseError> {
        self.operator
            .process_updated_changes(updated, topology_id, &mut self.manager)
    }

    /// Delivers a batch of removed item ids from one topology.
    pub fn process_removed(
        &mut self,
        topology_id: &TopologyId,
        removed: Vec<ItemId>,
    ) -> Result<(), TopoFuseError> {
        self.operator
            .process_removed_changes(removed, topology_id, &mut self.manager)
    }

    /// Feeds one newly-available remote procedure.
    pub fn rpc_available(&mut self, rpc: RpcIdentifier) {
        self.manager.rpc_available(rpc);
    }

    /// Feeds one withdrawn remote procedure.
    pub fn rpc_unavailable(&mut self, rpc: &RpcIdentifier) {
        self.manager.rpc_unavailable(rpc);
    }

    /// The manager behind the operator chain.
    pub fn manager(&self) -> &TopologyManager {
        &self.manager
    }

    /// Wraps the pipeline in its per-correlation mutex.
    pub fn into_shared(self) -> SharedPipeline {
        Arc::new(Mutex::new(self))
    }
}
