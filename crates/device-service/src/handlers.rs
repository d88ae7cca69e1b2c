/*!
 * Tenant-scoped REST surface for devices and host clients, plus the
 * internal webhook the Action Executor calls (§4.6, §6 "Device service").
 */

use axum::extract::{Path, Query, State};
use axum::Json;
use pipeline_common::{create_jwt, generate_device_token, hash_token, AuthContext, Error};
use pipeline_domain::command::{
    ControlDeviceRequest, DeviceCommand, DeviceCommandResponse, WebhookControlRequest,
    WebhookControlResponse,
};
use pipeline_domain::device::{
    ClientResponse, CreateDeviceRequest, Device, DeviceResponse, DeviceWithTokenResponse,
    HostClient, RegisterClientRequest, RegisterClientResponse, UpdateClientRequest,
    UpdateDeviceRequest,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::dispatch;
use crate::registry::DeviceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub registry: Arc<DeviceRegistry>,
    pub jwt_secret: String,
    pub client_token_ttl_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct ListLimit {
    pub limit: Option<i64>,
}

// --- Devices ---

pub async fn create_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateDeviceRequest>,
) -> Result<Json<DeviceWithTokenResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;

    let agent_token = generate_device_token();
    let agent_token_hash = hash_token(&agent_token);

    let device: Device = sqlx::query_as(
        "INSERT INTO devices (id, tenant, name, kind, status, agent_token_hash, metadata)
         VALUES ($1, $2, $3, $4, 'offline', $5, $6) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&auth.tenant)
    .bind(&req.name)
    .bind(&req.device_type)
    .bind(&agent_token_hash)
    .bind(req.metadata.unwrap_or_default())
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(DeviceWithTokenResponse {
        device: device.into(),
        agent_token,
    }))
}

pub async fn list_devices(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<DeviceResponse>>, Error> {
    let devices: Vec<Device> = sqlx::query_as("SELECT * FROM devices WHERE tenant = $1 ORDER BY created_at DESC")
        .bind(&auth.tenant)
        .fetch_all(&state.pool)
        .await?;
    Ok(Json(devices.into_iter().map(Into::into).collect()))
}

pub async fn get_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<Uuid>,
) -> Result<Json<DeviceResponse>, Error> {
    let device = fetch_device(&state.pool, device_id, &auth.tenant).await?;
    Ok(Json(device.into()))
}

pub async fn update_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<Uuid>,
    Json(req): Json<UpdateDeviceRequest>,
) -> Result<Json<DeviceResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;
    fetch_device(&state.pool, device_id, &auth.tenant).await?;

    let device: Device = sqlx::query_as(
        "UPDATE devices SET
            name = COALESCE($1, name),
            metadata = COALESCE($2, metadata),
            updated_at = now()
         WHERE id = $3 RETURNING *",
    )
    .bind(req.name)
    .bind(req.metadata)
    .bind(device_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(device.into()))
}

pub async fn delete_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    fetch_device(&state.pool, device_id, &auth.tenant).await?;
    state.registry.unregister_device(device_id).await;

    sqlx::query("DELETE FROM devices WHERE id = $1")
        .bind(device_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({ "deleted": device_id })))
}

pub async fn control_device(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<Uuid>,
    Json(req): Json<ControlDeviceRequest>,
) -> Result<Json<DeviceCommandResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;
    let device = fetch_device(&state.pool, device_id, &auth.tenant).await?;

    let (command, _status) = dispatch::dispatch_command(
        &state.pool,
        &state.registry,
        &device,
        &req.command_type,
        req.parameters.unwrap_or_default(),
    )
    .await?;

    Ok(Json(command.into()))
}

pub async fn list_commands(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(device_id): Path<Uuid>,
    Query(query): Query<ListLimit>,
) -> Result<Json<Vec<DeviceCommandResponse>>, Error> {
    fetch_device(&state.pool, device_id, &auth.tenant).await?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);

    let commands: Vec<DeviceCommand> = sqlx::query_as(
        "SELECT * FROM device_commands WHERE device_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(device_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(commands.into_iter().map(Into::into).collect()))
}

pub async fn get_command(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((device_id, command_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeviceCommandResponse>, Error> {
    fetch_device(&state.pool, device_id, &auth.tenant).await?;

    let command: DeviceCommand =
        sqlx::query_as("SELECT * FROM device_commands WHERE id = $1 AND device_id = $2")
            .bind(command_id)
            .bind(device_id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("command {command_id} not found")))?;

    Ok(Json(command.into()))
}

// --- Host clients ---

pub async fn register_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<RegisterClientRequest>,
) -> Result<Json<RegisterClientResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;

    let client_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO clients (id, tenant, name, client_type, os, version, status, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, 'offline', $7)",
    )
    .bind(client_id)
    .bind(&auth.tenant)
    .bind(&req.name)
    .bind(&req.client_type)
    .bind(&req.os)
    .bind(&req.version)
    .bind(req.metadata.unwrap_or_default())
    .execute(&state.pool)
    .await?;

    let client_token = create_jwt(
        &client_id.to_string(),
        &auth.tenant,
        &state.jwt_secret,
        state.client_token_ttl_seconds,
    )?;

    Ok(Json(RegisterClientResponse {
        client_id,
        client_token,
        tenant: auth.tenant,
    }))
}

pub async fn list_clients(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<ClientResponse>>, Error> {
    let clients: Vec<HostClient> =
        sqlx::query_as("SELECT * FROM clients WHERE tenant = $1 ORDER BY created_at DESC")
            .bind(&auth.tenant)
            .fetch_all(&state.pool)
            .await?;
    Ok(Json(clients.into_iter().map(Into::into).collect()))
}

pub async fn get_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientResponse>, Error> {
    let client = fetch_client(&state.pool, client_id, &auth.tenant).await?;
    Ok(Json(client.into()))
}

pub async fn update_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<ClientResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;
    fetch_client(&state.pool, client_id, &auth.tenant).await?;

    let client: HostClient = sqlx::query_as(
        "UPDATE clients SET
            name = COALESCE($1, name),
            metadata = COALESCE($2, metadata),
            updated_at = now()
         WHERE id = $3 RETURNING *",
    )
    .bind(req.name)
    .bind(req.metadata)
    .bind(client_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(client.into()))
}

pub async fn delete_client(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    fetch_client(&state.pool, client_id, &auth.tenant).await?;
    state.registry.unregister_client(client_id).await;

    sqlx::query("DELETE FROM clients WHERE id = $1")
        .bind(client_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({ "deleted": client_id })))
}

// --- Internal webhook (§4.6, called by the Rule Engine's Action Executor) ---

pub async fn webhook_control(
    State(state): State<AppState>,
    Json(req): Json<WebhookControlRequest>,
) -> Result<Json<WebhookControlResponse>, Error> {
    let device = fetch_device(&state.pool, req.device_id, &req.workspace_id).await?;

    let (command, status) = dispatch::dispatch_command(
        &state.pool,
        &state.registry,
        &device,
        &req.command_type,
        req.parameters,
    )
    .await?;

    let message = match status {
        pipeline_domain::command::WebhookControlStatus::Sent => {
            format!("command sent to device {}", device.name)
        }
        pipeline_domain::command::WebhookControlStatus::Pending => {
            format!("command queued for device {} (offline)", device.name)
        }
    };

    Ok(Json(WebhookControlResponse {
        command_id: command.id,
        status,
        message,
    }))
}

async fn fetch_device(pool: &PgPool, device_id: Uuid, tenant: &str) -> Result<Device, Error> {
    sqlx::query_as("SELECT * FROM devices WHERE id = $1 AND tenant = $2")
        .bind(device_id)
        .bind(tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("device {device_id} not found")))
}

async fn fetch_client(pool: &PgPool, client_id: Uuid, tenant: &str) -> Result<HostClient, Error> {
    sqlx::query_as("SELECT * FROM clients WHERE id = $1 AND tenant = $2")
        .bind(client_id)
        .bind(tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("client {client_id} not found")))
}
