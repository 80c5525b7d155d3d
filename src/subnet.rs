/* src/subnet.rs */

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::error::{RealGeoError, Result};

/// An inclusive window of IPv4 addresses, `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct AddressRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

#[derive(Deserialize)]
struct RangeBounds {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl TryFrom<RangeBounds> for AddressRange {
    type Error = RealGeoError;

    fn try_from(bounds: RangeBounds) -> Result<Self> {
        Self::new(bounds.start, bounds.end)
    }
}

impl AddressRange {
    /// Create a range, rejecting bounds that are out of order.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self> {
        if start > end {
            return Err(RealGeoError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    const fn fixed(start: [u8; 4], end: [u8; 4]) -> Self {
        Self {
            start: Ipv4Addr::new(start[0], start[1], start[2], start[3]),
            end: Ipv4Addr::new(end[0], end[1], end[2], end[3]),
        }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Both bounds are part of the range.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.start <= ip && ip <= self.end
    }
}

/// Reserved blocks consulted when no table is configured.
pub const DEFAULT_PRIVATE_RANGES: [AddressRange; 7] = [
    AddressRange::fixed([10, 0, 0, 0], [10, 255, 255, 255]),
    AddressRange::fixed([100, 64, 0, 0], [100, 127, 255, 255]),
    AddressRange::fixed([127, 0, 0, 0], [127, 255, 255, 255]),
    AddressRange::fixed([169, 254, 0, 0], [169, 254, 255, 255]),
    AddressRange::fixed([172, 16, 0, 0], [172, 31, 255, 255]),
    AddressRange::fixed([192, 168, 0, 0], [192, 168, 255, 255]),
    AddressRange::fixed([198, 18, 0, 0], [198, 19, 255, 255]),
];

/// Decides whether an address belongs to a private or reserved block.
///
/// The table is fixed at construction and only read afterwards, so a single
/// classifier can be shared freely between request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetClassifier {
    ranges: Vec<AddressRange>,
}

impl Default for SubnetClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PRIVATE_RANGES.to_vec())
    }
}

impl SubnetClassifier {
    /// Create a classifier over a custom range table.
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[AddressRange] {
        &self.ranges
    }

    /// Check if an address falls inside any configured range.
    ///
    /// IPv6 addresses are only evaluated through their IPv4-mapped form;
    /// every other IPv6 address is reported as not private.
    pub fn is_private(&self, ip: &IpAddr) -> bool {
        match ip {
            IpAddr::V4(ipv4) => self.is_private_v4(*ipv4),
            IpAddr::V6(ipv6) => ipv6
                .to_ipv4_mapped()
                .is_some_and(|ipv4| self.is_private_v4(ipv4)),
        }
    }

    fn is_private_v4(&self, ip: Ipv4Addr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}
