//! Named scripting-host registry.
//!
//! Scripted predicates are selected by configuration tag and constructed
//! once, when the pipeline is assembled. Embedding applications register a
//! factory per host tag; an unknown tag or a rejected script source fails
//! pipeline construction, never a running pipeline.

use std::collections::HashMap;

use crate::fuse_error::TopoFuseError;
use crate::operator::aggregator::matchers::PairMatcher;
use crate::operator::filtrator::predicates::Filtrator;

type FilterFactory = Box<dyn Fn(&str) -> Result<Box<dyn Filtrator>, TopoFuseError>>;
type MatcherFactory = Box<dyn Fn(&str) -> Result<Box<dyn PairMatcher>, TopoFuseError>>;

/// Registry of scripting hosts, keyed by configuration tag.
#[derive(Default)]
pub struct ScriptHosts {
    filters: HashMap<String, FilterFactory>,
    matchers: HashMap<String, MatcherFactory>,
}

impl ScriptHosts {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a host that compiles filter predicates.
    pub fn register_filter_host(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&str) -> Result<Box<dyn Filtrator>, TopoFuseError> + 'static,
    ) {
        self.filters.insert(tag.into(), Box::new(factory));
    }

    /// Registers a host that compiles aggregation match predicates.
    pub fn register_matcher_host(
        &mut self,
        tag: impl Into<String>,
        factory: impl Fn(&str) -> Result<Box<dyn PairMatcher>, TopoFuseError> + 'static,
    ) {
        self.matchers.insert(tag.into(), Box::new(factory));
    }

    /// Compiles a filter predicate on the named host.
    pub fn build_filter(
        &self,
        tag: &str,
        source: &str,
    ) -> Result<Box<dyn Filtrator>, TopoFuseError> {
        let factory = self
            .filters
            .get(tag)
            .ok_or_else(|| TopoFuseError::UnknownScriptHost(tag.to_string()))?;
        factory(source)
    }

    /// Compiles a match predicate on the named host.
    pub fn build_matcher(
        &self,
        tag: &str,
        source: &str,
    ) -> Result<Box<dyn PairMatcher>, TopoFuseError> {
        let factory = self
            .matchers
            .get(tag)
            .ok_or_else(|| TopoFuseError::UnknownScriptHost(tag.to_string()))?;
        factory(source)
    }
}

impl std::fmt::Debug for ScriptHosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHosts")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("matchers", &self.matchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::LeafValue;
    use std::collections::BTreeMap;

    struct AlwaysPass;
    impl Filtrator for AlwaysPass {
        fn passes(&self, _leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
            Ok(true)
        }
    }

    #[test]
    fn unknown_host_fails_construction() {
        let hosts = ScriptHosts::new();
        assert!(matches!(
            hosts.build_filter("lua", "return true"),
            Err(TopoFuseError::UnknownScriptHost(_))
        ));
    }

    #[test]
    fn registered_host_compiles_and_can_reject() {
        let mut hosts = ScriptHosts::new();
        hosts.register_filter_host("toy", |source| {
            if source.is_empty() {
                Err(TopoFuseError::InvalidScript {
                    host: "toy".to_string(),
                    message: "empty script".to_string(),
                })
            } else {
                Ok(Box::new(AlwaysPass))
            }
        });
        assert!(hosts.build_filter("toy", "x").is_ok());
        assert!(matches!(
            hosts.build_filter("toy", ""),
            Err(TopoFuseError::InvalidScript { .. })
        ));
    }
}
