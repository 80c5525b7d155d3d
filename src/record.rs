/* src/record.rs */

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{RealGeoError, Result};
use crate::extractor::{HeaderMap, IpExtractor};
use crate::geo::{GeoLocation, GeoLookup, GeoResult};

/// The parts of an inbound request the pipeline looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Lowercase header names mapped to their values.
    pub headers: HeaderMap,
    /// Transport peer address, `host:port`.
    pub remote_addr: String,
}

impl RequestInfo {
    pub fn new(remote_addr: impl Into<String>) -> Self {
        Self {
            headers: HeaderMap::new(),
            remote_addr: remote_addr.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }

    pub fn user_agent(&self) -> &str {
        self.headers.get("user-agent").map_or("", String::as_str)
    }
}

/// One enriched inbound request.
///
/// Geographic data is present exactly when the address was not private.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentRecord {
    timestamp: DateTime<Utc>,
    ip_address: String,
    user_agent: String,
    private_ip: bool,
    #[serde(flatten)]
    location: Option<GeoLocation>,
}

impl EnrichmentRecord {
    pub fn private(timestamp: DateTime<Utc>, ip_address: String, user_agent: String) -> Self {
        Self {
            timestamp,
            ip_address,
            user_agent,
            private_ip: true,
            location: None,
        }
    }

    pub fn located(
        timestamp: DateTime<Utc>,
        ip_address: String,
        user_agent: String,
        location: GeoLocation,
    ) -> Self {
        Self {
            timestamp,
            ip_address,
            user_agent,
            private_ip: false,
            location: Some(location),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn is_private(&self) -> bool {
        self.private_ip
    }

    pub fn location(&self) -> Option<&GeoLocation> {
        self.location.as_ref()
    }
}

impl fmt::Display for EnrichmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IP: {}", self.ip_address)?;
        if let Some(location) = &self.location {
            write!(f, " Country: {}", location.country)?;
            write!(f, " Region: {}", location.region)?;
            write!(f, " City: {}", location.city)?;
            write!(f, " Latitude: {:.4}", location.latitude)?;
            write!(f, " Longitude: {:.4}", location.longitude)?;
            write!(f, " ISP: {}", location.isp)?;
        }
        write!(f, " User-Agent: {}", self.user_agent)
    }
}

/// Runs resolution, classification and lookup for one request at a time.
///
/// Holds no per-request state; share it behind an `Arc` or clone it.
#[derive(Clone)]
pub struct RecordBuilder {
    extractor: IpExtractor,
    lookup: Arc<dyn GeoLookup>,
}

impl fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("extractor", &self.extractor)
            .finish_non_exhaustive()
    }
}

impl RecordBuilder {
    pub fn new(extractor: IpExtractor, lookup: Arc<dyn GeoLookup>) -> Self {
        Self { extractor, lookup }
    }

    pub fn extractor(&self) -> &IpExtractor {
        &self.extractor
    }

    /// Build the record for one request.
    ///
    /// Private addresses are recorded without a lookup. Otherwise the lookup
    /// must succeed; no partial record is produced on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved address is not an IP literal, or if
    /// the geolocation lookup fails.
    #[instrument(level = "debug", skip_all, fields(remote_addr = %request.remote_addr))]
    pub async fn build(&self, request: &RequestInfo) -> Result<EnrichmentRecord> {
        let timestamp = Utc::now();
        let extractor = &self.extractor;
        let resolved = extractor.resolve(&request.headers, &request.remote_addr);
        let user_agent = request.user_agent().to_string();

        let Some(ip) = resolved.ip() else {
            return Err(RealGeoError::InvalidIpFormat(resolved.address));
        };
        let address = resolved.address;

        if extractor.classifier().is_private(&ip) {
            debug!(%ip, "private address, skipping lookup");
            let record = EnrichmentRecord::private(timestamp, address, user_agent);
            return Ok(record);
        }

        let record = match self.lookup.lookup(&address).await? {
            GeoResult::Located(location) => {
                EnrichmentRecord::located(timestamp, address, user_agent, location)
            }
            GeoResult::Private => EnrichmentRecord::private(timestamp, address, user_agent),
        };
        Ok(record)
    }
}
