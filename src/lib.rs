//! # Real IP Geolocation
//!
//! Resolve the real client IP address of an HTTP request behind one or more
//! reverse proxies, classify it against a table of private and reserved
//! ranges, and enrich public addresses with geolocation data.
//!
//! ## Features
//!
//! - Right-to-left scan of `X-Forwarded-For`, then `X-Real-IP`, skipping private hops
//! - Fallback to the transport peer address
//! - Configurable reserved-range table with inclusive bounds
//! - ip-api compatible geolocation client behind the [`GeoLookup`] trait
//! - Optional Axum layer and extractor via the `axum` feature
//!
//! ## Examples
//!
//! ### Resolving an address
//!
//! ```rust
//! use real_geo::{HeaderMap, resolve_client_address};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("x-forwarded-for".to_string(), "203.0.113.5, 10.0.0.1".to_string());
//!
//! // 10.0.0.1 is private, so the scan continues leftward.
//! assert_eq!(resolve_client_address(&headers, "10.0.0.2:443"), "203.0.113.5");
//! ```
//!
//! ### Building a record
//!
//! ```rust,no_run
//! use real_geo::{Config, RequestInfo};
//!
//! # async fn run() -> real_geo::Result<()> {
//! let builder = Config::default().build()?;
//! let request = RequestInfo::new("198.51.100.7:54321").with_header("User-Agent", "curl/8.0");
//! let record = builder.build(&request).await?;
//! println!("{record}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extractor;
pub mod geo;
pub mod record;
pub mod sink;
pub mod subnet;

#[cfg(feature = "axum")]
pub mod middleware;

pub use config::{Config, GeoConfig, LogConfig, LogFormatter, ResolverConfig};
pub use error::{RealGeoError, Result};
pub use extractor::{
    AddressSource, HeaderMap, IpExtractor, ResolvedAddress, is_global_unicast,
    resolve_client_address,
};
pub use geo::{GeoLocation, GeoLookup, GeoResult, IpApiClient, parse_response};
pub use record::{EnrichmentRecord, RecordBuilder, RequestInfo};
pub use sink::{RecordSink, TracingSink};
pub use subnet::{AddressRange, DEFAULT_PRIVATE_RANGES, SubnetClassifier};

#[cfg(feature = "axum")]
pub use middleware::{ClientAddress, GeoLogLayer, GeoLogService};

/// Re-export commonly used types
pub use std::net::IpAddr;
