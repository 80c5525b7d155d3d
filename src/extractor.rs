/* src/extractor.rs */

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use tracing::debug;

use crate::subnet::SubnetClassifier;

/// Type alias for header maps. Keys are expected to be lowercase header names.
pub type HeaderMap = HashMap<String, String>;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Where a resolved address was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSource {
    /// Entry `position` (zero-based, left to right) of the named header's chain.
    Header { name: String, position: usize },
    /// Host part of the transport peer address.
    Connection,
}

/// The address judged to be the client's true address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    pub address: String,
    pub source: AddressSource,
}

impl ResolvedAddress {
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// Parse the address. Connection fallbacks are not validated, so this may fail.
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self.source, AddressSource::Header { .. })
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Configuration for client address resolution.
#[derive(Debug, Clone)]
pub struct IpExtractor {
    /// Proxy-chain headers to check, in order of preference.
    pub headers: Vec<String>,
    /// Table used to skip private hops.
    pub classifier: SubnetClassifier,
}

impl Default for IpExtractor {
    fn default() -> Self {
        Self {
            headers: vec![X_FORWARDED_FOR.to_string(), X_REAL_IP.to_string()],
            classifier: SubnetClassifier::default(),
        }
    }
}

impl IpExtractor {
    /// Create a new extractor with the default headers and range table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set headers to check, in order of preference.
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    /// Set the range table used to skip private hops.
    pub fn with_classifier(mut self, classifier: SubnetClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classifier(&self) -> &SubnetClassifier {
        &self.classifier
    }

    /// Resolve the client address from proxy headers, falling back to the
    /// host part of `remote_addr` (`host:port`) when no header yields a
    /// public address. Never fails.
    pub fn resolve(&self, headers: &HeaderMap, remote_addr: &str) -> ResolvedAddress {
        if let Some(resolved) = self.resolve_from_headers(headers) {
            return resolved;
        }

        let host = connection_host(remote_addr);
        debug!(remote_addr, host, "using connection peer");
        ResolvedAddress {
            address: host.to_string(),
            source: AddressSource::Connection,
        }
    }

    fn resolve_from_headers(&self, headers: &HeaderMap) -> Option<ResolvedAddress> {
        for header_name in &self.headers {
            let name = header_name.to_lowercase();
            let Some(header_value) = headers.get(&name) else {
                continue;
            };
            if let Some((position, address)) = self.scan_chain(header_value) {
                debug!(header = %name, position, address, "resolved forwarded address");
                return Some(ResolvedAddress {
                    address: address.to_string(),
                    source: AddressSource::Header { name, position },
                });
            }
        }
        None
    }

    /// Walk a comma-separated chain from the nearest proxy (rightmost) outward
    /// and return the first public global-unicast entry.
    fn scan_chain<'a>(&self, value: &'a str) -> Option<(usize, &'a str)> {
        let entries: Vec<&str> = value.split(',').map(str::trim).collect();

        for (position, entry) in entries.iter().enumerate().rev() {
            let Ok(ip) = entry.parse::<IpAddr>() else {
                debug!(entry, "skipping unparseable chain entry");
                continue;
            };
            if !is_global_unicast(&ip) || self.classifier.is_private(&ip) {
                debug!(%ip, "skipping non-public chain entry");
                continue;
            }
            return Some((position, *entry));
        }
        None
    }
}

/// Check if an address is unicast and not loopback, link-local, unspecified or broadcast.
///
/// RFC 1918 space still counts as global unicast here; the range table decides privacy.
pub fn is_global_unicast(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let reserved = ipv4.is_unspecified() || ipv4.is_loopback() || ipv4.is_multicast();
            !(reserved || ipv4.is_link_local() || ipv4.is_broadcast())
        }
        IpAddr::V6(ipv6) => match ipv6.to_ipv4_mapped() {
            Some(ipv4) => is_global_unicast(&IpAddr::V4(ipv4)),
            None => {
                // fe80::/10
                let link_local = (ipv6.segments()[0] & 0xffc0) == 0xfe80;
                let reserved = ipv6.is_unspecified() || ipv6.is_loopback();
                !(reserved || ipv6.is_multicast() || link_local)
            }
        },
    }
}

/// Strip the trailing port from a transport peer address.
///
/// Accepts `1.2.3.4:5678`, `[::1]:5678` and bare hosts; anything else is
/// returned trimmed but otherwise untouched.
fn connection_host(remote_addr: &str) -> &str {
    let addr = remote_addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once(']') {
            return host;
        }
    }

    if let Some((host, port)) = addr.rsplit_once(':') {
        let numeric_port = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
        if numeric_port && !host.contains(':') {
            return host;
        }
    }

    addr
}

/// Convenience function to resolve the client address with the default
/// headers (`X-Forwarded-For`, then `X-Real-IP`) and range table.
///
/// # Examples
///
/// ```rust
/// use real_geo::{HeaderMap, resolve_client_address};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-forwarded-for".to_string(), "8.8.8.8, 192.168.1.1".to_string());
///
/// assert_eq!(resolve_client_address(&headers, "10.0.0.2:443"), "8.8.8.8");
/// assert_eq!(resolve_client_address(&HeaderMap::new(), "198.51.100.7:54321"), "198.51.100.7");
/// ```
pub fn resolve_client_address(headers: &HeaderMap, remote_addr: &str) -> String {
    IpExtractor::default().resolve(headers, remote_addr).address
}
