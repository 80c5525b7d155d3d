/* src/middleware.rs */

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{HeaderMap, request::Parts},
    response::Response,
};
use futures_util::future::BoxFuture;
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::extractor::{IpExtractor, ResolvedAddress};
use crate::record::{RecordBuilder, RequestInfo};
use crate::sink::{RecordSink, TracingSink};

/// Extension that holds the resolved client address.
#[derive(Debug, Clone)]
pub struct ClientAddress(pub ResolvedAddress);

impl ClientAddress {
    pub fn address(&self) -> &str {
        self.0.as_str()
    }
}

/// Layer that resolves the client address of every request and, once the
/// inner service has produced its response, enriches the request in the
/// background and hands the record to a sink.
///
/// The response is returned without waiting for the geolocation lookup, so
/// enrichment must run inside a Tokio runtime. Enrichment failures are
/// logged and never change the response.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use real_geo::{Config, GeoLogLayer};
///
/// # fn app() -> real_geo::Result<Router> {
/// let builder = Config::default().build()?;
/// let app = Router::new()
///     .route("/", get(|| async { "ok" }))
///     .layer(GeoLogLayer::new(builder));
/// # Ok(app)
/// # }
/// ```
#[derive(Clone)]
pub struct GeoLogLayer {
    builder: Arc<RecordBuilder>,
    sink: Arc<dyn RecordSink>,
}

impl GeoLogLayer {
    /// Create a layer that logs records through `tracing`.
    pub fn new(builder: RecordBuilder) -> Self {
        Self {
            builder: Arc::new(builder),
            sink: Arc::new(TracingSink),
        }
    }

    /// Send records to a different sink.
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl<S> Layer<S> for GeoLogLayer {
    type Service = GeoLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GeoLogService {
            inner,
            builder: self.builder.clone(),
            sink: self.sink.clone(),
        }
    }
}

/// Service produced by [`GeoLogLayer`].
#[derive(Clone)]
pub struct GeoLogService<S> {
    inner: S,
    builder: Arc<RecordBuilder>,
    sink: Arc<dyn RecordSink>,
}

impl<S> Service<Request> for GeoLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let connect_info = req.extensions().get::<ConnectInfo<SocketAddr>>();
        let info = request_info(req.headers(), connect_info);

        let extractor = self.builder.extractor();
        let resolved = extractor.resolve(&info.headers, &info.remote_addr);
        req.extensions_mut().insert(ClientAddress(resolved));

        let builder = self.builder.clone();
        let sink = self.sink.clone();
        let future = self.inner.call(req);
        Box::pin(async move {
            let response = future.await?;
            tokio::spawn(enrich(builder, sink, info));
            Ok(response)
        })
    }
}

async fn enrich(builder: Arc<RecordBuilder>, sink: Arc<dyn RecordSink>, info: RequestInfo) {
    match builder.build(&info).await {
        Ok(record) => sink.store(record).await,
        Err(err) => {
            warn!(error = %err, remote_addr = %info.remote_addr, "failed to enrich request");
        }
    }
}

fn request_info(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> RequestInfo {
    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr.to_string());
    RequestInfo {
        headers: headers_to_map(headers),
        remote_addr: remote_addr.unwrap_or_default(),
    }
}

/// Convert Axum headers to our internal header map format.
fn headers_to_map(headers: &HeaderMap) -> crate::extractor::HeaderMap {
    let mut map = crate::extractor::HeaderMap::new();

    for (name, value) in headers.iter() {
        let Ok(value_str) = value.to_str() else {
            continue;
        };
        // Repeated headers are joined the way proxies append to a chain.
        let name = name.as_str().to_lowercase();
        match map.get_mut(&name) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value_str);
            }
            None => {
                map.insert(name, value_str.to_string());
            }
        }
    }

    map
}

/// Axum extractor for the resolved client address.
///
/// Without [`GeoLogLayer`] installed, the address is resolved on the spot
/// with the default headers and range table.
impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(client) = parts.extensions.get::<ClientAddress>() {
            return Ok(client.clone());
        }

        let connect_info = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        let info = request_info(&parts.headers, connect_info);
        let extractor = IpExtractor::default();
        let resolved = extractor.resolve(&info.headers, &info.remote_addr);
        Ok(ClientAddress(resolved))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{Router, body::Body, routing::get};
    use tokio::sync::{Notify, mpsc};
    use tokio::time::timeout;
    use tower::ServiceExt;

    use super::*;
    use crate::error::{RealGeoError, Result as LookupResult};
    use crate::geo::{GeoLocation, GeoLookup, GeoResult};
    use crate::record::EnrichmentRecord;

    const PEER: &str = "10.0.0.9:41000";
    const WAIT: Duration = Duration::from_secs(2);
    const QUIET: Duration = Duration::from_millis(200);

    type Records = mpsc::UnboundedReceiver<EnrichmentRecord>;

    struct FixedLookup {
        succeeds: bool,
        gate: Option<Arc<Notify>>,
    }

    impl FixedLookup {
        fn located() -> Self {
            Self {
                succeeds: true,
                gate: None,
            }
        }

        fn failing() -> Self {
            Self {
                succeeds: false,
                gate: None,
            }
        }
    }

    #[async_trait]
    impl GeoLookup for FixedLookup {
        async fn lookup(&self, _address: &str) -> LookupResult<GeoResult> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if !self.succeeds {
                let message = "expected value".to_string();
                return Err(RealGeoError::MalformedResponse(message));
            }
            Ok(GeoResult::Located(GeoLocation {
                country: "Netherlands".to_string(),
                city: "Amsterdam".to_string(),
                ..GeoLocation::default()
            }))
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<EnrichmentRecord>);

    #[async_trait]
    impl RecordSink for ChannelSink {
        async fn store(&self, record: EnrichmentRecord) {
            let _ = self.0.send(record);
        }
    }

    async fn echo(client: ClientAddress) -> String {
        client.address().to_string()
    }

    fn app(lookup: FixedLookup) -> (Router, Records) {
        let (tx, rx) = mpsc::unbounded_channel();
        let builder = RecordBuilder::new(IpExtractor::default(), Arc::new(lookup));
        let sink = Arc::new(ChannelSink(tx));
        let layer = GeoLogLayer::new(builder).with_sink(sink);
        (Router::new().route("/", get(echo)).layer(layer), rx)
    }

    fn request(forwarded_for: &str, peer: &str) -> Request {
        axum::http::Request::builder()
            .uri("/")
            .header("x-forwarded-for", forwarded_for)
            .header("user-agent", "test-agent")
            .extension(ConnectInfo(peer.parse::<SocketAddr>().unwrap()))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn next_record(records: &mut Records) -> Option<EnrichmentRecord> {
        timeout(WAIT, records.recv()).await.unwrap()
    }

    #[tokio::test]
    async fn test_layer_resolves_and_records() {
        let (router, mut records) = app(FixedLookup::located());
        let req = request("198.51.100.4, 10.0.0.3", PEER);
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(body_text(response).await, "198.51.100.4");

        let record = next_record(&mut records).await.unwrap();
        assert_eq!(record.ip_address(), "198.51.100.4");
        assert_eq!(record.user_agent(), "test-agent");
        let city = record.location().map(|l| l.city.as_str());
        assert_eq!(city, Some("Amsterdam"));
    }

    #[tokio::test]
    async fn test_private_request_recorded_without_lookup() {
        let (router, mut records) = app(FixedLookup::failing());
        let req = request("10.0.0.3", "192.168.0.20:41000");
        let response = router.oneshot(req).await.unwrap();
        assert_eq!(body_text(response).await, "192.168.0.20");

        let record = next_record(&mut records).await.unwrap();
        assert!(record.is_private());
    }

    #[tokio::test]
    async fn test_enrichment_failure_keeps_response() {
        let (router, mut records) = app(FixedLookup::failing());
        let req = request("203.0.113.50", PEER);
        let response = router.oneshot(req).await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(body_text(response).await, "203.0.113.50");

        let received = timeout(QUIET, records.recv()).await;
        assert!(!matches!(received, Ok(Some(_))));
    }

    #[tokio::test]
    async fn test_response_does_not_wait_for_lookup() {
        let gate = Arc::new(Notify::new());
        let lookup = FixedLookup {
            succeeds: true,
            gate: Some(gate.clone()),
        };
        let (router, mut records) = app(lookup);

        let req = request("203.0.113.50", PEER);
        let response = timeout(WAIT, router.oneshot(req)).await.unwrap().unwrap();
        assert_eq!(body_text(response).await, "203.0.113.50");
        assert!(records.try_recv().is_err());

        gate.notify_one();
        let record = next_record(&mut records).await.unwrap();
        assert_eq!(record.ip_address(), "203.0.113.50");
    }

    #[tokio::test]
    async fn test_extractor_without_layer() {
        let router = Router::new().route("/", get(echo));
        let response = router.oneshot(request("8.8.8.8", PEER)).await.unwrap();
        assert_eq!(body_text(response).await, "8.8.8.8");
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", "203.0.113.1".parse().unwrap());
        headers.append("x-forwarded-for", "198.51.100.2".parse().unwrap());

        let map = headers_to_map(&headers);
        assert_eq!(map["x-forwarded-for"], "203.0.113.1, 198.51.100.2");
    }
}
