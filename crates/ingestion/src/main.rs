/*!
 * Livestream Ingestor Service
 *
 * Owns one worker task per connected livestream session (§4.1, §5): accepts
 * connect/disconnect requests over REST, normalizes external source events
 * onto the shared `Event` envelope, and appends them to the per-tenant
 * broker stream that the Rule Consumer reads from.
 */

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod config;
mod handlers;
mod metrics;
mod registry;
mod source;
mod worker;

use crate::config::IngestorConfig;
use crate::handlers::AppState;
use crate::registry::SessionRegistry;
use crate::source::GatewayLivestreamSource;

#[derive(Clone)]
struct ServiceState {
    ready: Arc<AtomicBool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    pipeline_common::init_tracing();

    info!("Starting Livestream Ingestor service");

    let config = IngestorConfig::from_env().context("failed to load configuration")?;

    let pool = pipeline_common::create_pool(&config.database_url, 10)
        .await
        .context("failed to create database pool")?;

    let source = Arc::new(GatewayLivestreamSource::new(
        std::env::var("LIVESTREAM_GATEWAY_URL")
            .unwrap_or_else(|_| "wss://livestream-gateway.internal/ws".to_string()),
    ));

    let state = AppState {
        pool,
        broker_redis_url: config.redis_url(),
        stream_maxlen: config.stream_maxlen,
        registry: Arc::new(SessionRegistry::new()),
        source,
    };

    let service_state = ServiceState {
        ready: Arc::new(AtomicBool::new(true)),
    };

    let api_router = Router::new()
        .route("/api/livestreams/connect", post(handlers::connect_livestream))
        .route("/api/livestreams", get(handlers::list_livestreams))
        .route("/api/livestreams/:id", get(handlers::get_livestream))
        .route(
            "/api/livestreams/:id/disconnect",
            post(handlers::disconnect_livestream),
        )
        .with_state(state)
        .layer(Extension(config.jwt_secret.clone()));

    let health_router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(service_state);

    let app = api_router.merge(health_router);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Ingestor REST surface listening on http://{}", addr);

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            warn!("metrics server failed: {e}");
        }
    });

    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.context("server failed")
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        res = server => {
            res.context("server task panicked")??;
        }
    }

    info!("Livestream Ingestor stopped");
    Ok(())
}

async fn start_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route("/metrics", get(render_metrics));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics server to {addr}"))?;
    info!("Metrics listening on http://{}/metrics", addr);
    axum::serve(listener, app).await.context("metrics server failed")
}

async fn render_metrics() -> String {
    metrics::render_metrics().unwrap_or_else(|e| format!("# error rendering metrics: {e}"))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "ingestion",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<ServiceState>,
) -> Json<Value> {
    Json(json!({
        "ready": state.ready.load(Ordering::SeqCst),
        "service": "ingestion",
    }))
}
