use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::sync::Arc;

use axum::{Router, routing::get};
use color_eyre::eyre::{Context, eyre};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http_server::{http_routes::random, state::AppState};
use crate::services::random_pick::RandomPickService;

pub const DEFAULT_PORT: u16 = 3838;

pub struct HttpServerConfig {
    pub port: u16,
    pub picks: RandomPickService,
}

pub fn router(app_state: Arc<AppState>) -> Router {
    let cors_layer = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/", get(random::index))
        .route("/api/random", get(random::api_random))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state)
}

/// The address other machines on the LAN would use to reach us.
///
/// Connecting a UDP socket sends nothing; it only makes the OS pick a route.
fn local_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub async fn start(config: HttpServerConfig) -> color_eyre::Result<()> {
    let app = router(Arc::new(AppState {
        picks: config.picks,
    }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", config.port))?;

    log::info!("Serving on http://{}:{}", local_ip(), config.port);
    axum::serve(listener, app)
        .await
        .wrap_err("Failed to start HTTP server")?;

    Ok(())
}
