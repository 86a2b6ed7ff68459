use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use clap::Parser;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gatewatch::config::GatewatchConfig;
use gatewatch::http::{enforce_rate_limit, RateLimitState};
use gatewatch::ratelimit::{LimitType, MemoryStore, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "gatewatch", version, about = "Adaptive rate limiting middleware service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Listen address, overriding the configuration file
    #[arg(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting Gatewatch");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.config.as_deref() {
        Some(path) => GatewatchConfig::from_file(path)?,
        None => GatewatchConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let store = Arc::new(MemoryStore::new());
    let limiter = Arc::new(RateLimiter::with_policies(
        store,
        config.rate_limiting.policy_table(),
        config.rate_limiting.blocking_policy(),
    ));
    info!("Rate limiter initialized");

    let app = router(limiter).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.server.listen_addr).await?;
    info!("Listening on {}", config.server.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Gatewatch stopped");
    Ok(())
}

/// Demonstration API: each route group carries the limit type routing has
/// assigned to it. The limiter itself is shared across all groups so
/// blocking applies everywhere at once.
fn router(limiter: Arc<RateLimiter>) -> Router {
    let auth_routes = Router::new()
        .route("/auth/login", post(login))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(limiter.clone(), LimitType::Auth),
            enforce_rate_limit,
        ));

    let read_routes = Router::new()
        .route("/api/projects", get(list_projects))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(limiter.clone(), LimitType::Read),
            enforce_rate_limit,
        ));

    let write_routes = Router::new()
        .route("/api/tasks", post(create_task))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(limiter, LimitType::Write),
            enforce_rate_limit,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(auth_routes)
        .merge(read_routes)
        .merge(write_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn login() -> Json<serde_json::Value> {
    Json(json!({ "status": "accepted" }))
}

async fn list_projects() -> Json<serde_json::Value> {
    Json(json!({ "projects": [] }))
}

async fn create_task() -> Json<serde_json::Value> {
    Json(json!({ "status": "created" }))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
