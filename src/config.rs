/* src/config.rs */

use std::{
    convert::Infallible,
    fmt::{self, Display, Formatter},
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{RealGeoError, Result};
use crate::extractor::{IpExtractor, X_FORWARDED_FOR, X_REAL_IP};
use crate::geo::IpApiClient;
use crate::record::RecordBuilder;
use crate::subnet::{AddressRange, DEFAULT_PRIVATE_RANGES, SubnetClassifier};

/// Top-level configuration, usually loaded from a YAML file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub geo: GeoConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RealGeoError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| RealGeoError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the enrichment pipeline described by this configuration.
    ///
    /// The process entry point decides what to do with a failure here.
    ///
    /// # Errors
    ///
    /// Returns an error if the geolocation settings are invalid or the HTTP
    /// client for the service cannot be built.
    pub fn build(&self) -> Result<RecordBuilder> {
        let lookup = IpApiClient::new(&self.geo)?;
        Ok(RecordBuilder::new(self.resolver.extractor(), Arc::new(lookup)))
    }
}

/// Geolocation service settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GeoConfig {
    #[serde(default = "GeoConfig::default_endpoint")]
    pub endpoint: String,

    #[serde(default = "GeoConfig::default_user_agent")]
    pub user_agent: String,

    #[serde(default = "GeoConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "GeoConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl GeoConfig {
    #[inline]
    #[must_use]
    pub fn default_endpoint() -> String {
        "http://ip-api.com".to_string()
    }

    #[inline]
    #[must_use]
    pub fn default_user_agent() -> String {
        concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
    }

    #[inline]
    #[must_use]
    pub const fn default_timeout_ms() -> u64 {
        5_000
    }

    #[inline]
    #[must_use]
    pub const fn default_connect_timeout_ms() -> u64 {
        2_000
    }

    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reject settings under which every lookup would fail.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero timeout, or an endpoint that is not an
    /// absolute `http`/`https` URL with a host.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 || self.connect_timeout_ms == 0 {
            let message = "geo timeouts must be greater than zero".to_string();
            return Err(RealGeoError::InvalidConfig(message));
        }

        let endpoint = match reqwest::Url::parse(&self.endpoint) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                let message = format!("geo endpoint `{}` is not a URL: {err}", self.endpoint);
                return Err(RealGeoError::InvalidConfig(message));
            }
        };
        if !matches!(endpoint.scheme(), "http" | "https") || !endpoint.has_host() {
            let message = format!("geo endpoint `{}` must be an http(s) URL", self.endpoint);
            return Err(RealGeoError::InvalidConfig(message));
        }

        Ok(())
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            user_agent: Self::default_user_agent(),
            timeout_ms: Self::default_timeout_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
        }
    }
}

/// Client address resolution settings.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ResolverConfig {
    #[serde(default = "ResolverConfig::default_headers")]
    pub headers: Vec<String>,

    #[serde(default = "ResolverConfig::default_private_ranges")]
    pub private_ranges: Vec<AddressRange>,
}

impl ResolverConfig {
    #[inline]
    #[must_use]
    pub fn default_headers() -> Vec<String> {
        vec![X_FORWARDED_FOR.to_string(), X_REAL_IP.to_string()]
    }

    #[inline]
    #[must_use]
    pub fn default_private_ranges() -> Vec<AddressRange> {
        DEFAULT_PRIVATE_RANGES.to_vec()
    }

    #[must_use]
    pub fn extractor(&self) -> IpExtractor {
        IpExtractor::new()
            .with_headers(self.headers.clone())
            .with_classifier(SubnetClassifier::new(self.private_ranges.clone()))
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            headers: Self::default_headers(),
            private_ranges: Self::default_private_ranges(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "LogConfig::default_filters")]
    pub filters: String,

    #[serde(default = "LogConfig::default_formatter")]
    pub formatter: LogFormatter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filters: Self::default_filters(),
            formatter: Self::default_formatter(),
        }
    }
}

impl LogConfig {
    #[inline]
    #[must_use]
    pub fn default_filters() -> String {
        "info".to_string()
    }

    #[inline]
    #[must_use]
    pub const fn default_formatter() -> LogFormatter {
        LogFormatter::Pretty
    }

    /// Install the global tracing subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already set.
    pub fn init(&self) -> Result<()> {
        let filter_layer = tracing_subscriber::filter::EnvFilter::new(self.filters.as_str());

        let fmt = tracing_subscriber::fmt::layer().with_target(true);
        let fmt_layer = match self.formatter {
            LogFormatter::Pretty => fmt.pretty().boxed(),
            LogFormatter::Json => fmt.json().flatten_event(true).boxed(),
        };

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init()?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogFormatter {
    Pretty,
    Json,
}

impl FromStr for LogFormatter {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            _ => Ok(Self::Pretty),
        }
    }
}

impl Display for LogFormatter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl Serialize for LogFormatter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogFormatter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let Ok(formatter) = text.parse::<Self>();
        Ok(formatter)
    }
}

/// Path used when no config file is given explicitly.
#[must_use]
pub fn default_config_path() -> PathBuf {
    PathBuf::from("real-geo.yaml")
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.geo.endpoint, "http://ip-api.com");
        assert!(config.geo.user_agent.starts_with("real-geo/"));
        assert_eq!(config.geo.timeout(), Duration::from_secs(5));

        let headers = vec!["x-forwarded-for", "x-real-ip"];
        assert_eq!(config.resolver.headers, headers);
        let ranges = &config.resolver.private_ranges;
        assert_eq!(ranges.len(), DEFAULT_PRIVATE_RANGES.len());
        assert_eq!(config.log.formatter, LogFormatter::Pretty);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r"
geo:
  endpoint: http://geo.internal:8080
  timeout_ms: 750
log:
  formatter: json
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.geo.endpoint, "http://geo.internal:8080");
        assert_eq!(config.geo.timeout(), Duration::from_millis(750));
        assert_eq!(config.geo.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.resolver, ResolverConfig::default());
        assert_eq!(config.log.formatter, LogFormatter::Json);
    }

    #[test]
    fn test_custom_ranges() {
        let yaml = r"
resolver:
  headers: [x-real-ip]
  private_ranges:
    - start: 203.0.113.0
      end: 203.0.113.255
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let extractor = config.resolver.extractor();
        assert_eq!(extractor.headers, vec!["x-real-ip"]);

        let inside: IpAddr = "203.0.113.9".parse().unwrap();
        let outside: IpAddr = "10.0.0.1".parse().unwrap();
        let classifier = extractor.classifier();
        assert!(classifier.is_private(&inside));
        assert!(!classifier.is_private(&outside));
    }

    #[test]
    fn test_inverted_range_fails_to_load() {
        let yaml = r"
resolver:
  private_ranges:
    - start: 192.168.0.0
      end: 182.168.255.255
";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/real-geo.yaml").unwrap_err();
        assert!(matches!(err, RealGeoError::ReadConfig { .. }));
    }

    #[test]
    fn test_build_accepts_defaults() {
        assert!(Config::default().geo.validate().is_ok());
        assert!(Config::default().build().is_ok());
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        let mut config = Config::default();
        config.geo.timeout_ms = 0;
        let err = config.build().unwrap_err();
        assert!(matches!(err, RealGeoError::InvalidConfig(_)));

        let mut config = Config::default();
        config.geo.connect_timeout_ms = 0;
        let err = config.build().unwrap_err();
        assert!(matches!(err, RealGeoError::InvalidConfig(_)));
    }

    #[test]
    fn test_build_rejects_malformed_endpoint() {
        for endpoint in ["ip-api.com", "ftp://ip-api.com", "http://", ""] {
            let mut config = Config::default();
            config.geo.endpoint = endpoint.to_string();
            let err = config.build().unwrap_err();
            assert!(matches!(err, RealGeoError::InvalidConfig(_)), "{endpoint}");
        }
    }

    #[test]
    fn test_formatter_parsing() {
        assert_eq!("JSON".parse::<LogFormatter>().unwrap(), LogFormatter::Json);
        let Ok(formatter) = "plain".parse::<LogFormatter>();
        assert_eq!(formatter, LogFormatter::Pretty);
        assert_eq!(LogFormatter::Json.to_string(), "json");
    }
}
