//! Match strategies deciding whether two underlay items aggregate.

use crate::fuse_error::TopoFuseError;
use crate::model::item::UnderlayItem;

/// Pairwise match predicate between a stored candidate and a new item.
pub trait PairMatcher {
    /// True when `candidate` and `item` describe the same entity.
    ///
    /// Evaluation failures (scripted matchers) abort the current event only.
    fn matches(&self, candidate: &UnderlayItem, item: &UnderlayItem)
    -> Result<bool, TopoFuseError>;
}

// Blanket impl for Box<T>
impl<T: PairMatcher + ?Sized> PairMatcher for Box<T> {
    #[inline]
    fn matches(
        &self,
        candidate: &UnderlayItem,
        item: &UnderlayItem,
    ) -> Result<bool, TopoFuseError> {
        (**self).matches(candidate, item)
    }
}

/// Default strategy: items match when their correlation leaf maps are equal.
///
/// An item with no leaves never matches anything.
#[derive(Clone, Debug, Default)]
pub struct LeafEqualityMatcher;

impl PairMatcher for LeafEqualityMatcher {
    fn matches(
        &self,
        candidate: &UnderlayItem,
        item: &UnderlayItem,
    ) -> Result<bool, TopoFuseError> {
        Ok(!candidate.leaves.is_empty() && candidate.leaves == item.leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::identifier::{ItemId, TopologyId};
    use crate::model::item::CorrelationKind;
    use crate::model::value::LeafValue;

    fn node(topology: &str, id: &str, ip: Option<&str>) -> UnderlayItem {
        let item = UnderlayItem::new(
            TopologyId::new(topology),
            ItemId::new(id),
            CorrelationKind::Node,
        );
        match ip {
            Some(ip) => item.with_leaf("ip", LeafValue::from(ip)),
            None => item,
        }
    }

    #[test]
    fn equal_leaf_maps_match() {
        let matcher = LeafEqualityMatcher;
        let a = node("t1", "n1", Some("192.168.1.1"));
        let b = node("t2", "n9", Some("192.168.1.1"));
        assert!(matcher.matches(&a, &b).unwrap());
    }

    #[test]
    fn differing_or_missing_leaves_do_not_match() {
        let matcher = LeafEqualityMatcher;
        let a = node("t1", "n1", Some("192.168.1.1"));
        let b = node("t2", "n9", Some("192.168.1.2"));
        let empty = node("t3", "n3", None);
        assert!(!matcher.matches(&a, &b).unwrap());
        assert!(!matcher.matches(&empty, &empty.clone()).unwrap());
    }
}
