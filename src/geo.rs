/* src/geo.rs */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GeoConfig;
use crate::error::{RealGeoError, Result};

/// Geographic and network-ownership data for a public address.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoLocation {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub zip: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub isp: String,
    pub organization: String,
    pub as_name: String,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoResult {
    Located(GeoLocation),
    /// The service reported the address as private or reserved.
    Private,
}

/// A geolocation backend.
///
/// Callers classify addresses locally first and never hand a private
/// address to a lookup.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> Result<GeoResult>;
}

/// Wire format of the `/json/{address}` endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeoApiResponse {
    status: Option<String>,
    message: String,
    country: String,
    #[serde(rename = "countryCode")]
    country_code: String,
    region: String,
    #[serde(rename = "regionName")]
    region_name: String,
    city: String,
    zip: String,
    lat: f64,
    lon: f64,
    timezone: String,
    isp: String,
    org: String,
    #[serde(rename = "as")]
    as_name: String,
    query: String,
}

impl GeoApiResponse {
    fn into_result(self) -> Result<GeoResult> {
        let Self {
            status,
            message,
            country,
            country_code,
            region,
            region_name,
            city,
            zip,
            lat,
            lon,
            timezone,
            isp,
            org,
            as_name,
            query,
        } = self;

        match status.as_deref() {
            None => Err(RealGeoError::MalformedResponse("missing `status` field".to_string())),
            Some("success") => {
                debug!(%query, %country_code, %city, "address located");
                Ok(GeoResult::Located(GeoLocation {
                    country,
                    country_code,
                    region,
                    region_name,
                    city,
                    zip,
                    latitude: lat,
                    longitude: lon,
                    timezone,
                    isp,
                    organization: org,
                    as_name,
                }))
            }
            Some("fail") if is_reserved_message(&message) => {
                debug!(%query, %message, "service reports reserved address");
                Ok(GeoResult::Private)
            }
            Some(status) => Err(RealGeoError::UnexpectedStatus {
                status: status.to_string(),
                message,
            }),
        }
    }
}

fn is_reserved_message(message: &str) -> bool {
    let message = message.trim();
    message.eq_ignore_ascii_case("private range") || message.eq_ignore_ascii_case("reserved range")
}

/// Interpret a raw response body from the geolocation service.
pub fn parse_response(body: &str) -> Result<GeoResult> {
    serde_json::from_str::<GeoApiResponse>(body)
        .map_err(|err| RealGeoError::MalformedResponse(err.to_string()))?
        .into_result()
}

/// Client for an ip-api compatible JSON endpoint.
///
/// One GET per lookup, bounded by the configured timeout, never retried.
#[derive(Debug, Clone)]
pub struct IpApiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IpApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the underlying HTTP
    /// client cannot be constructed.
    pub fn new(config: &GeoConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(RealGeoError::HttpClient)?;

        Ok(Self::with_client(client, config.endpoint.clone()))
    }

    /// Wrap an already configured `reqwest::Client`.
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn url(&self, address: &str) -> String {
        format!("{}/json/{}", self.endpoint.trim_end_matches('/'), address)
    }
}

#[async_trait]
impl GeoLookup for IpApiClient {
    async fn lookup(&self, address: &str) -> Result<GeoResult> {
        let url = self.url(address);
        debug!(%url, "querying geolocation service");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(RealGeoError::Transport)?;
        let body = response.text().await.map_err(RealGeoError::Transport)?;

        parse_response(&body)
    }
}
