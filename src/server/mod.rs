mod handlers;
mod middleware;
mod state;

use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::recommender::Recommender;

pub use middleware::RateLimits;
pub use state::AppState;

fn cors(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| warn!("Ignoring invalid CORS origin '{}'", o))
                .ok()
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
}

pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    let limits = state.limits.clone();

    let api = Router::new()
        .route("/restaurants", get(handlers::restaurants))
        .route("/recommend", post(handlers::recommend))
        .route("/usage", get(handlers::usage))
        .route_layer(from_fn_with_state(limits.clone(), middleware::api_limit));

    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(from_fn_with_state(limits, middleware::global_limit))
        .layer(cors(&config.allowed_origins))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::new(config.request_timeout()));

    for layer in middleware::security_headers() {
        router = router.layer(layer);
    }
    router.with_state(state)
}

pub async fn start(config: &Config, recommender: Recommender) -> std::io::Result<()> {
    let state = Arc::new(AppState::new(recommender));

    let limits = state.limits.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            limits.prune();
        }
    });

    let app = build_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("what2eat listening on http://{}", addr);
    info!(
        "Daily API limit {}, quota resets at midnight {}",
        config.daily_limit,
        config.quota_tz.name()
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
}
