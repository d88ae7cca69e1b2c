/*!
 * REST Handlers: Livestream Connect/Disconnect Lifecycle
 */

use axum::extract::{Path, State};
use axum::Json;
use pipeline_common::{AuthContext, Error};
use pipeline_domain::session::{ConnectLivestreamRequest, LivestreamSessionResponse};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::registry::SessionRegistry;
use crate::source::{parse_source_handle, LivestreamSource};
use crate::worker::{self, WorkerContext};

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub broker_redis_url: String,
    pub stream_maxlen: usize,
    pub registry: Arc<SessionRegistry>,
    pub source: Arc<dyn LivestreamSource>,
}

pub async fn connect_livestream(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ConnectLivestreamRequest>,
) -> Result<Json<LivestreamSessionResponse>, Error> {
    req.validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let handle = parse_source_handle(&req.tiktok_input)?;

    let session_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO livestream_sessions (id, tenant, source_handle, status) VALUES ($1, $2, $3, 'connecting')",
    )
    .bind(session_id)
    .bind(&auth.tenant)
    .bind(&req.tiktok_input)
    .execute(&state.pool)
    .await?;

    let (tx, rx) = mpsc::channel(4);
    state.registry.register(session_id, tx).await;

    let broker = pipeline_common::Broker::connect(&state.broker_redis_url).await?;
    let ctx = WorkerContext {
        session_id,
        tenant: auth.tenant.clone(),
        pool: state.pool.clone(),
        broker,
        stream_maxlen: state.stream_maxlen,
    };
    let source = Arc::clone(&state.source);
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        worker::run(ctx, handle, source, rx).await;
        registry.deregister(session_id).await;
    });

    info!(%session_id, tenant = %auth.tenant, "livestream session worker started");

    let session = fetch_session(&state.pool, session_id, &auth.tenant).await?;
    Ok(Json(session.into()))
}

pub async fn disconnect_livestream(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<LivestreamSessionResponse>, Error> {
    let session = fetch_session(&state.pool, session_id, &auth.tenant).await?;
    state.registry.signal_disconnect(session_id).await;
    Ok(Json(session.into()))
}

pub async fn get_livestream(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(session_id): Path<Uuid>,
) -> Result<Json<LivestreamSessionResponse>, Error> {
    let session = fetch_session(&state.pool, session_id, &auth.tenant).await?;
    Ok(Json(session.into()))
}

pub async fn list_livestreams(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<LivestreamSessionResponse>>, Error> {
    let sessions: Vec<pipeline_domain::session::LivestreamSession> = sqlx::query_as(
        "SELECT * FROM livestream_sessions WHERE tenant = $1 ORDER BY created_at DESC",
    )
    .bind(&auth.tenant)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

async fn fetch_session(
    pool: &sqlx::PgPool,
    session_id: Uuid,
    tenant: &str,
) -> Result<pipeline_domain::session::LivestreamSession, Error> {
    sqlx::query_as("SELECT * FROM livestream_sessions WHERE id = $1 AND tenant = $2")
        .bind(session_id)
        .bind(tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("livestream session {session_id} not found")))
}
