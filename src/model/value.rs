//! Correlation leaf values.
//!
//! Underlay items carry a small map of named leaf values used purely for
//! matching. The value space is a closed union over the kinds correlation
//! actually compares: text, integers, booleans, IP prefixes, plus a
//! structured JSON fallback for payload fragments that are matched
//! whole-value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::fuse_error::TopoFuseError;

/// One correlation leaf value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LeafValue {
    /// Plain text leaf (node names, IP address strings, …).
    Text(String),
    /// Integer leaf.
    Number(i64),
    /// Boolean leaf.
    Boolean(bool),
    /// IP prefix leaf.
    Prefix(IpPrefix),
    /// Structured fallback for leaves without a dedicated kind.
    Structured(serde_json::Value),
}

impl LeafValue {
    /// Returns the text content, if this is a text leaf.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LeafValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric content, if this is a number leaf.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            LeafValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a boolean leaf.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            LeafValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Parses the leaf as an IP address, accepting text leaves.
    pub fn as_ip_addr(&self) -> Option<IpAddr> {
        match self {
            LeafValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for LeafValue {
    fn from(raw: &str) -> Self {
        LeafValue::Text(raw.to_string())
    }
}

impl From<i64> for LeafValue {
    fn from(raw: i64) -> Self {
        LeafValue::Number(raw)
    }
}

impl From<bool> for LeafValue {
    fn from(raw: bool) -> Self {
        LeafValue::Boolean(raw)
    }
}

/// An IP prefix (network address plus mask length), IPv4 or IPv6.
///
/// The network address is normalized on construction: host bits beyond the
/// mask are zeroed, so two prefixes covering the same network compare equal.
///
/// # Example
/// ```rust
/// use topo_fuse::model::value::IpPrefix;
/// let prefix: IpPrefix = "192.168.1.0/24".parse().unwrap();
/// assert!(prefix.contains("192.168.1.17".parse().unwrap()));
/// assert!(!prefix.contains("192.168.2.1".parse().unwrap()));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPrefix {
    network: IpAddr,
    length: u8,
}

fn v4_mask(length: u8) -> u32 {
    if length == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(length))
    }
}

fn v6_mask(length: u8) -> u128 {
    if length == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(length))
    }
}

impl IpPrefix {
    /// Builds a prefix from an address and mask length.
    ///
    /// Fails when the length exceeds the family's address width.
    pub fn new(addr: IpAddr, length: u8) -> Result<Self, TopoFuseError> {
        let network = match addr {
            IpAddr::V4(v4) => {
                if length > 32 {
                    return Err(TopoFuseError::InvalidPrefix(format!("{addr}/{length}")));
                }
                IpAddr::V4(Ipv4Addr::from(u32::from(v4) & v4_mask(length)))
            }
            IpAddr::V6(v6) => {
                if length > 128 {
                    return Err(TopoFuseError::InvalidPrefix(format!("{addr}/{length}")));
                }
                IpAddr::V6(Ipv6Addr::from(u128::from(v6) & v6_mask(length)))
            }
        };
        Ok(IpPrefix { network, length })
    }

    /// Returns the normalized network address.
    pub fn network(&self) -> IpAddr {
        self.network
    }

    /// Returns the mask length.
    pub fn length(&self) -> u8 {
        self.length
    }

    /// Returns true when `addr` falls inside this prefix.
    ///
    /// An address of the other family never matches.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(a)) => {
                u32::from(a) & v4_mask(self.length) == u32::from(net)
            }
            (IpAddr::V6(net), IpAddr::V6(a)) => {
                u128::from(a) & v6_mask(self.length) == u128::from(net)
            }
            _ => false,
        }
    }
}

impl FromStr for IpPrefix {
    type Err = TopoFuseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let bad = || TopoFuseError::InvalidPrefix(raw.to_string());
        let (addr, length) = raw.split_once('/').ok_or_else(bad)?;
        let addr: IpAddr = addr.parse().map_err(|_| bad())?;
        let length: u8 = length.parse().map_err(|_| bad())?;
        IpPrefix::new(addr, length).map_err(|_| bad())
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.length)
    }
}
