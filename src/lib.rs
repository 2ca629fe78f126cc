//! Forge gateway: multi-actor credentials, worker field gating and
//! per-scope realtime fan-out for project/task tracking.
//!
//! The binary in `main.rs` adds process concerns (telemetry, CLI, CORS);
//! everything routable lives here so integration tests in `tests/` can drive it.

use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Router};

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod store;

use errors::AppError;
use middleware::credentials::CredentialService;
use middleware::metrics::ForgeMetrics;
use middleware::rate_limit::RateLimiter;
use realtime::{Broadcaster, ConnectionRegistry};
use store::ForgeStore;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: config::Config,
    pub store: Arc<dyn ForgeStore>,
    pub credentials: CredentialService,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,
    pub limiter: RateLimiter,
    pub metrics: Arc<ForgeMetrics>,
}

impl AppState {
    pub fn new(config: config::Config, store: Arc<dyn ForgeStore>) -> anyhow::Result<Arc<Self>> {
        let metrics = Arc::new(ForgeMetrics::new()?);
        let registry = Arc::new(ConnectionRegistry::new());
        Ok(Arc::new(Self {
            credentials: CredentialService::new(store.clone(), config.hash),
            broadcaster: Broadcaster::new(registry.clone(), metrics.clone()),
            limiter: RateLimiter::new(
                config.rate_limit,
                config.rate_limit_window,
                config.rate_limit_capacity,
            ),
            registry,
            metrics,
            store,
            config,
        }))
    }
}

/// Every route the service exposes, with state applied.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .route(
            "/ws/forge/projects/:project_id",
            get(realtime::socket::project_ws),
        )
        .route("/ws/threads/:thread_id", get(realtime::socket::thread_ws))
        .nest("/api/forge", api::api_router(state.clone()))
        .fallback(|| async { AppError::NotFound })
        .with_state(state)
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        state.metrics.encode(),
    )
}
