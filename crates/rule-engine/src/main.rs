/*!
 * Rule Engine Service
 *
 * Hosts the Rule Consumer (background task) and the Rule REST CRUD surface
 * (§4.3, §4.4, §6) in a single process.
 */

use anyhow::{Context, Result};
use axum::routing::{delete, get, patch, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tokio::signal;
use tracing::{info, warn};

mod condition;
mod config;
mod consumer;
mod executor;
mod handlers;
mod metrics;

use crate::config::RuleEngineConfig;
use crate::consumer::ConsumerContext;
use crate::handlers::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    pipeline_common::init_tracing();

    info!("Starting Rule Engine service");

    let config = RuleEngineConfig::from_env().context("failed to load configuration")?;

    let pool = pipeline_common::create_pool(&config.database_url, 10)
        .await
        .context("failed to create database pool")?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let consumer_ctx = ConsumerContext {
        pool: pool.clone(),
        broker: pipeline_common::Broker::connect(&config.redis_url())
            .await
            .context("failed to connect to event broker")?,
        http: reqwest::Client::new(),
        device_service_url: config.device_service_url.clone(),
        read_count: config.read_count,
        block_time_ms: config.block_time_ms,
        webhook_deadline: config.webhook_deadline,
        device_control_deadline: config.device_control_deadline,
    };
    let consumer_shutdown = shutdown_tx.subscribe();
    let consumer_handle = tokio::spawn(consumer::run(consumer_ctx, consumer_shutdown));

    let app_state = AppState { pool };

    let api_router = Router::new()
        .route("/api/rules", post(handlers::create_rule).get(handlers::list_rules))
        .route("/api/rules/:id", get(handlers::get_rule).delete(handlers::delete_rule))
        .route("/api/rules/:id/activate", patch(handlers::activate_rule))
        .route("/api/rules/:id/deactivate", patch(handlers::deactivate_rule))
        .route("/api/rules/:id/executions", get(handlers::list_executions))
        .with_state(app_state)
        .layer(Extension(config.jwt_secret.clone()));

    let metrics_router = Router::new().route("/metrics", get(render_metrics));
    let health_router = Router::new().route("/health", get(health_check));

    let app = api_router.merge(health_router);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Rule Engine REST surface listening on http://{}", addr);

    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&metrics_addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("failed to bind metrics server: {e}");
                return;
            }
        };
        if let Err(e) = axum::serve(listener, metrics_router).await {
            warn!("metrics server failed: {e}");
        }
    });

    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        res = server => {
            if let Err(e) = res.context("server task panicked")? {
                warn!("server failed: {e}");
            }
        }
    }

    let _ = shutdown_tx.send(());
    let _ = consumer_handle.await;

    info!("Rule Engine stopped");
    Ok(())
}

async fn render_metrics() -> String {
    metrics::render_metrics().unwrap_or_else(|e| format!("# error rendering metrics: {e}"))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "rule-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
