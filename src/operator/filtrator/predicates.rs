//! Boolean predicates over named correlation leaves.
//!
//! Each predicate reads one named leaf out of a leaf map; a missing or
//! unusable leaf fails the predicate (logged, never an error), so the
//! owning filtrator simply drops the item.

use std::collections::BTreeMap;

use crate::fuse_error::TopoFuseError;
use crate::model::value::{IpPrefix, LeafValue};

/// One boolean predicate of a filtration chain.
pub trait Filtrator {
    /// True when the leaf map passes this predicate.
    ///
    /// Evaluation failures (scripted predicates) abort the current event
    /// only; built-ins never fail.
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError>;
}

// Blanket impl for Box<T>
impl<T: Filtrator + ?Sized> Filtrator for Box<T> {
    #[inline]
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
        (**self).passes(leaves)
    }
}

/// Passes when the named leaf equals an expected value.
#[derive(Clone, Debug)]
pub struct ValueFiltrator {
    leaf: String,
    expected: LeafValue,
}

impl ValueFiltrator {
    /// Builds the predicate.
    pub fn new(leaf: impl Into<String>, expected: LeafValue) -> Self {
        ValueFiltrator {
            leaf: leaf.into(),
            expected,
        }
    }
}

impl Filtrator for ValueFiltrator {
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
        match leaves.get(&self.leaf) {
            Some(value) => Ok(*value == self.expected),
            None => {
                log::debug!("leaf `{}` missing; value filter fails", self.leaf);
                Ok(false)
            }
        }
    }
}

/// Passes when the named numeric leaf lies in an inclusive range.
#[derive(Clone, Debug)]
pub struct NumberRangeFiltrator {
    leaf: String,
    min: i64,
    max: i64,
}

impl NumberRangeFiltrator {
    /// Builds the predicate over `min..=max`.
    pub fn new(leaf: impl Into<String>, min: i64, max: i64) -> Self {
        NumberRangeFiltrator {
            leaf: leaf.into(),
            min,
            max,
        }
    }
}

impl Filtrator for NumberRangeFiltrator {
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
        match leaves.get(&self.leaf).and_then(LeafValue::as_number) {
            Some(n) => Ok(self.min <= n && n <= self.max),
            None => {
                log::debug!("leaf `{}` missing or not numeric; range filter fails", self.leaf);
                Ok(false)
            }
        }
    }
}

/// Passes when the named text leaf lies in an inclusive lexicographic range.
#[derive(Clone, Debug)]
pub struct StringRangeFiltrator {
    leaf: String,
    min: String,
    max: String,
}

impl StringRangeFiltrator {
    /// Builds the predicate over `min..=max`.
    pub fn new(leaf: impl Into<String>, min: impl Into<String>, max: impl Into<String>) -> Self {
        StringRangeFiltrator {
            leaf: leaf.into(),
            min: min.into(),
            max: max.into(),
        }
    }
}

impl Filtrator for StringRangeFiltrator {
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
        match leaves.get(&self.leaf).and_then(LeafValue::as_text) {
            Some(s) => Ok(self.min.as_str() <= s && s <= self.max.as_str()),
            None => {
                log::debug!("leaf `{}` missing or not text; range filter fails", self.leaf);
                Ok(false)
            }
        }
    }
}

/// Passes when the named leaf parses as an IP address inside a prefix.
#[derive(Clone, Debug)]
pub struct IpPrefixFiltrator {
    leaf: String,
    prefix: IpPrefix,
}

impl IpPrefixFiltrator {
    /// Builds the predicate.
    pub fn new(leaf: impl Into<String>, prefix: IpPrefix) -> Self {
        IpPrefixFiltrator {
            leaf: leaf.into(),
            prefix,
        }
    }
}

impl Filtrator for IpPrefixFiltrator {
    fn passes(&self, leaves: &BTreeMap<String, LeafValue>) -> Result<bool, TopoFuseError> {
        match leaves.get(&self.leaf).and_then(LeafValue::as_ip_addr) {
            Some(addr) => Ok(self.prefix.contains(addr)),
            None => {
                log::debug!("leaf `{}` missing or not an address; prefix filter fails", self.leaf);
                Ok(false)
            }
        }
    }
}
