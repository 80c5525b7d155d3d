use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
};
use real_geo::{ClientAddress, Config, GeoLogLayer, config::default_config_path};
use std::{error::Error, net::SocketAddr};

const TARGET_URL_ENV: &str = "REAL_GEO_TARGET_URL";
const CONFIG_PATH_ENV: &str = "REAL_GEO_CONFIG";

/// Redirects every request to a fixed target and records who asked.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = load_config()?;
    config.log.init()?;

    let target = std::env::var(TARGET_URL_ENV)
        .map_err(|_| format!("{TARGET_URL_ENV} is not set"))?;

    let builder = config.build()?;
    let app = Router::new()
        .fallback(move |client| redirect(client, target.clone()))
        .layer(GeoLogLayer::new(builder));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn load_config() -> real_geo::Result<Config> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => Config::load(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                Config::load(path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn redirect(client: ClientAddress, target: String) -> impl IntoResponse {
    tracing::debug!(client = client.address(), %target, "redirecting");
    (StatusCode::FOUND, [(header::LOCATION, target)])
}
