/* src/error.rs */

use std::net::Ipv4Addr;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for operations that may fail with `RealGeoError`.
pub type Result<T> = std::result::Result<T, RealGeoError>;

/// Errors that can occur while resolving, enriching or configuring.
#[derive(Error, Debug)]
pub enum RealGeoError {
    /// Resolved client address is not an IP literal.
    #[error("Invalid IP address format: {0}")]
    InvalidIpFormat(String),

    /// A reserved range whose start is greater than its end.
    #[error("Invalid address range: start {start} is greater than end {end}")]
    InvalidRange { start: Ipv4Addr, end: Ipv4Addr },

    /// The geolocation request could not be completed.
    #[error("Geolocation request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The geolocation response body could not be understood.
    #[error("Malformed geolocation response: {0}")]
    MalformedResponse(String),

    /// The geolocation service answered with a status we do not handle.
    #[error("Unexpected geolocation status `{status}`: {message}")]
    UnexpectedStatus { status: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// A setting that would make every lookup fail.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not read config from {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse config from {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Failed to install log subscriber: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

impl RealGeoError {
    /// Whether the lookup failed before a response body was obtained.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether a response arrived but could not be interpreted.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            Self::MalformedResponse(_) | Self::UnexpectedStatus { .. }
        )
    }
}
