/*!
 * Persistent agent channels (§4.6, §6 "Persistent channels").
 *
 * Both endpoints share one shape: authenticate from the path, register an
 * outbox in the connection registry, replay anything left `pending` from
 * before this connection existed, then run a `select!` loop that is equally
 * ready to push a registry-delivered outbound message or to read the next
 * inbound frame — the same two-way loop the reference dashboard websocket
 * handler uses for its Redis-pubsub-to-client forwarding, generalized here
 * to forward from the in-process registry channel instead.
 */

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use pipeline_common::{hash_token, verify_jwt};
use pipeline_domain::device::{AgentStatus, Device, HostClient};
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch;
use crate::handlers::AppState;
use crate::metrics;

pub async fn device_ws_handler(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_device_socket(socket, token, state))
}

pub async fn client_ws_handler(
    ws: WebSocketUpgrade,
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_client_socket(socket, token, state))
}

async fn handle_device_socket(socket: WebSocket, token: String, state: AppState) {
    let hash = hash_token(&token);
    let device: Device = match sqlx::query_as("SELECT * FROM devices WHERE agent_token_hash = $1")
        .bind(&hash)
        .fetch_optional(&state.pool)
        .await
    {
        Ok(Some(d)) => d,
        Ok(None) => {
            warn!("device websocket: invalid agent token presented");
            return;
        }
        Err(e) => {
            warn!("device websocket: failed to look up agent token: {e}");
            return;
        }
    };

    info!(device_id = %device.id, "device agent connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Value>(16);
    state.registry.register_device(device.id, tx).await;
    metrics::CONNECTED_DEVICES.inc();

    if let Err(e) = mark_device_status(&state.pool, device.id, AgentStatus::Online).await {
        warn!(device_id = %device.id, "failed to mark device online: {e}");
    }

    match dispatch::replay_pending_for_device(&state.pool, &state.registry, device.id).await {
        Ok(0) => {}
        Ok(n) => info!(device_id = %device.id, "replayed {n} pending command(s) to device"),
        Err(e) => warn!(device_id = %device.id, "failed to replay pending commands: {e}"),
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_device_message(&state, device.id, &text, &mut sender).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(device_id = %device.id, "device websocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if sender.send(Message::Text(message.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break, // superseded by a newer connection for this device
                }
            }
        }
    }

    state.registry.release_device(device.id, &tx).await;
    metrics::CONNECTED_DEVICES.dec();
    if let Err(e) = mark_device_status(&state.pool, device.id, AgentStatus::Offline).await {
        warn!(device_id = %device.id, "failed to mark device offline: {e}");
    }
    info!(device_id = %device.id, "device agent disconnected");
}

async fn handle_client_socket(socket: WebSocket, token: String, state: AppState) {
    let claims = match verify_jwt(&token, &state.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            warn!("client websocket: invalid client credential: {e}");
            return;
        }
    };

    let Ok(client_id) = Uuid::parse_str(&claims.sub) else {
        warn!("client websocket: credential subject is not a valid client id");
        return;
    };

    let client: HostClient =
        match sqlx::query_as("SELECT * FROM clients WHERE id = $1 AND tenant = $2")
            .bind(client_id)
            .bind(&claims.tenant)
            .fetch_optional(&state.pool)
            .await
        {
            Ok(Some(c)) => c,
            Ok(None) => {
                warn!(%client_id, "client websocket: unknown client for tenant");
                return;
            }
            Err(e) => {
                warn!("client websocket: failed to look up client: {e}");
                return;
            }
        };

    info!(client_id = %client.id, tenant = %client.tenant, "host client connected");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Value>(16);
    state
        .registry
        .register_client(client.id, client.tenant.clone(), tx)
        .await;
    metrics::CONNECTED_CLIENTS.inc();

    if let Err(e) = mark_client_status(&state.pool, client.id, AgentStatus::Online).await {
        warn!(client_id = %client.id, "failed to mark client online: {e}");
    }

    match dispatch::replay_pending_for_client(&state.pool, &state.registry, client.id).await {
        Ok(0) => {}
        Ok(n) => info!(client_id = %client.id, "replayed {n} pending command(s) to client"),
        Err(e) => warn!(client_id = %client.id, "failed to replay pending commands: {e}"),
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, client.id, &text, &mut sender).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(client_id = %client.id, "client websocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if sender.send(Message::Text(message.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.registry.release_client(client.id, &tx).await;
    metrics::CONNECTED_CLIENTS.dec();
    if let Err(e) = mark_client_status(&state.pool, client.id, AgentStatus::Offline).await {
        warn!(client_id = %client.id, "failed to mark client offline: {e}");
    }
    info!(client_id = %client.id, "host client disconnected");
}

async fn handle_device_message(
    state: &AppState,
    device_id: Uuid,
    text: &str,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(%device_id, "invalid JSON from device: {e}");
            return;
        }
    };

    if value.get("command_id").is_some() {
        metrics::AGENT_MESSAGES_TOTAL
            .with_label_values(&["device", "result"])
            .inc();
        apply_command_reply(&state.pool, &value).await;
        return;
    }

    if value.get("type").and_then(Value::as_str) == Some("ping") {
        metrics::AGENT_MESSAGES_TOTAL
            .with_label_values(&["device", "ping"])
            .inc();
        if let Err(e) = mark_device_status(&state.pool, device_id, AgentStatus::Online).await {
            warn!(%device_id, "failed to refresh device heartbeat: {e}");
        }
        let _ = sender
            .send(Message::Text(json!({"type": "pong"}).to_string().into()))
            .await;
        return;
    }

    warn!(%device_id, "unrecognized message from device: {value}");
}

async fn handle_client_message(
    state: &AppState,
    client_id: Uuid,
    text: &str,
    sender: &mut SplitSink<WebSocket, Message>,
) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(%client_id, "invalid JSON from client: {e}");
            return;
        }
    };

    let message_type = value.get("type").and_then(Value::as_str).unwrap_or("");
    metrics::AGENT_MESSAGES_TOTAL
        .with_label_values(&["client", message_type])
        .inc();

    match message_type {
        "heartbeat" => {
            if let Err(e) = mark_client_status(&state.pool, client_id, AgentStatus::Online).await {
                warn!(%client_id, "failed to refresh client heartbeat: {e}");
            }
            let _ = sender
                .send(Message::Text(json!({"type": "pong"}).to_string().into()))
                .await;
        }
        "result" | "error" => {
            apply_command_reply(&state.pool, &value).await;
        }
        "device_discovered" => {
            // Acknowledged but intentionally inert: creating a Device row
            // stays an explicit REST operation (§1.2 supplement).
            debug!(%client_id, "device discovery reported: {value}");
        }
        other => {
            warn!(%client_id, "unknown message type from client: {other}");
        }
    }
}

/// Shared tail of both agent styles' `{command_id, status, result?, error?}`
/// reply shape (§6). An unresolvable `command_id` is logged and dropped.
async fn apply_command_reply(pool: &PgPool, value: &Value) {
    let Some(command_id) = value
        .get("command_id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
    else {
        warn!("command reply carried no valid command_id, dropping");
        return;
    };

    let status = value.get("status").and_then(Value::as_str).unwrap_or("completed");

    let updated = if status == "failed" {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        dispatch::mark_failed(pool, command_id, error).await
    } else {
        let result = value.get("result").cloned();
        dispatch::mark_completed(pool, command_id, result).await
    };

    match updated {
        Ok(Some(_)) => {}
        Ok(None) => warn!(%command_id, "reply for unknown command_id, dropping"),
        Err(e) => warn!(%command_id, "failed to persist command reply: {e}"),
    }
}

async fn mark_device_status(
    pool: &PgPool,
    device_id: Uuid,
    status: AgentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE devices SET status = $1, last_seen = now() WHERE id = $2")
        .bind(status)
        .bind(device_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn mark_client_status(
    pool: &PgPool,
    client_id: Uuid,
    status: AgentStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE clients SET status = $1, last_seen = now() WHERE id = $2")
        .bind(status)
        .bind(client_id)
        .execute(pool)
        .await?;
    Ok(())
}
