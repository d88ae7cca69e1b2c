/*!
 * Device Command Router service
 *
 * Hosts the tenant-scoped device/client REST surface, the internal webhook
 * the Rule Engine calls, and the two persistent agent channels (§4.5, §4.6)
 * in a single process sharing one connection registry.
 */

use anyhow::{Context, Result};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

mod config;
mod dispatch;
mod handlers;
mod metrics;
mod registry;
mod ws;

use crate::config::DeviceServiceConfig;
use crate::handlers::AppState;
use crate::registry::DeviceRegistry;

#[derive(Clone)]
struct ServiceState {
    ready: Arc<AtomicBool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    pipeline_common::init_tracing();

    info!("Starting Device Command Router service");

    let config = DeviceServiceConfig::from_env().context("failed to load configuration")?;

    let pool = pipeline_common::create_pool(&config.database_url, 10)
        .await
        .context("failed to create database pool")?;

    let state = AppState {
        pool,
        registry: Arc::new(DeviceRegistry::new()),
        jwt_secret: config.jwt_secret.clone(),
        client_token_ttl_seconds: config.client_token_ttl_seconds,
    };

    let service_state = ServiceState {
        ready: Arc::new(AtomicBool::new(true)),
    };

    let api_router = Router::new()
        .route("/api/devices", post(handlers::create_device).get(handlers::list_devices))
        .route(
            "/api/devices/:id",
            get(handlers::get_device)
                .patch(handlers::update_device)
                .delete(handlers::delete_device),
        )
        .route("/api/devices/:id/control", post(handlers::control_device))
        .route("/api/devices/:id/commands", get(handlers::list_commands))
        .route(
            "/api/devices/:id/commands/:command_id",
            get(handlers::get_command),
        )
        .route("/api/clients/register", post(handlers::register_client))
        .route("/api/clients", get(handlers::list_clients))
        .route(
            "/api/clients/:id",
            get(handlers::get_client)
                .patch(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .with_state(state.clone())
        .layer(Extension(config.jwt_secret.clone()));

    let webhook_router = Router::new()
        .route("/api/webhook/control", post(handlers::webhook_control))
        .with_state(state.clone());

    let ws_router = Router::new()
        .route("/ws/device/:token", get(ws::device_ws_handler))
        .route("/ws/client/:client_token", get(ws::client_ws_handler))
        .with_state(state);

    let health_router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(service_state);

    let app = api_router.merge(webhook_router).merge(ws_router).merge(health_router);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Device Service REST surface listening on http://{}", addr);

    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            warn!("metrics server failed: {e}");
        }
    });

    let server = tokio::spawn(async move { axum::serve(listener, app).await.context("server failed") });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        res = server => {
            res.context("server task panicked")??;
        }
    }

    info!("Device Command Router stopped");
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
        "service": "device-service",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn readiness_check(
    axum::extract::State(state): axum::extract::State<ServiceState>,
) -> Json<Value> {
    Json(json!({
        "ready": state.ready.load(Ordering::SeqCst),
        "service": "device-service",
    }))
}
