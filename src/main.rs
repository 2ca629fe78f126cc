use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forge::store::memory::MemoryStore;
use forge::store::postgres::PgStore;
use forge::store::ForgeStore;
use forge::{cli, config, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // OTLP export is opt-in via OTEL_EXPORTER_OTLP_ENDPOINT.
    use opentelemetry::KeyValue;

    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "forge-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "forge=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Purge { older_than_days }) => {
            let store = open_store(&cfg).await?;
            let report = jobs::cleanup::purge(store.as_ref(), older_than_days).await?;
            println!(
                "Purged {} tombstoned worker(s) and {} expired credential(s).",
                report.workers, report.credentials
            );
            Ok(())
        }
        Some(cli::Commands::Migrate) => {
            let url = cfg
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            let db = PgStore::connect(url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn open_store(cfg: &config::Config) -> anyhow::Result<Arc<dyn ForgeStore>> {
    match &cfg.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let db = PgStore::connect(url).await?;

            tracing::info!("Running migrations...");
            db.migrate().await?;
            let store: Arc<dyn ForgeStore> = Arc::new(db);
            Ok(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            let store: Arc<dyn ForgeStore> = Arc::new(MemoryStore::new());
            Ok(store)
        }
    }
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let store = open_store(&cfg).await?;
    let retention_days = cfg.tombstone_retention_days;
    let dashboard_origin = cfg.dashboard_origin.clone();

    let state = AppState::new(cfg, store.clone())?;

    let app = forge::build_router(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // restrict CORS origins to the dashboard (plus localhost for dev)
        .layer({
            use axum::http::{HeaderName, Method};
            use tower_http::cors::AllowOrigin;
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin, _| {
                    let origin_str = origin.to_str().unwrap_or("");
                    origin_str == dashboard_origin
                        || origin_str.starts_with("http://localhost:")
                        || origin_str.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::DELETE,
                    Method::PATCH,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static(forge::middleware::rbac::API_KEY_HEADER),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true)
        })
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    if retention_days > 0 {
        jobs::cleanup::spawn(store, retention_days);
        tracing::info!(retention_days, "Background cleanup job started (tombstone purge every 1h)");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Forge gateway listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows clients to correlate errors with gateway logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    use axum::http::HeaderValue;

    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // API keys and session responses must never be cached
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}
