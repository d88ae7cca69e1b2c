/*!
 * Command lifecycle (§4.6 "Command lifecycle", "Replay on reconnect").
 *
 * The authoritative path for getting a command from a REST/webhook caller
 * to an agent: persist `pending`, attempt an immediate send through the
 * registry, and transition to `sent` only if that send actually succeeded.
 * A dead channel is treated as a disconnect (unregistered) rather than an
 * error — the command stays `pending` for the next reconnect's replay.
 */

use pipeline_common::Error;
use pipeline_domain::command::{DeviceCommand, WebhookControlStatus};
use pipeline_domain::device::Device;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::metrics;
use crate::registry::DeviceRegistry;

pub async fn create_command(
    pool: &PgPool,
    device_id: Uuid,
    command_type: &str,
    parameters: &Value,
) -> Result<DeviceCommand, Error> {
    let command: DeviceCommand = sqlx::query_as(
        "INSERT INTO device_commands (id, device_id, command_type, parameters, status)
         VALUES ($1, $2, $3, $4, 'pending') RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(device_id)
    .bind(command_type)
    .bind(parameters)
    .fetch_one(pool)
    .await?;
    Ok(command)
}

/// Persists and attempts to deliver a command for `device` (§4.6 steps 1-4;
/// existence/tenant checks happen in the caller before this runs).
pub async fn dispatch_command(
    pool: &PgPool,
    registry: &DeviceRegistry,
    device: &Device,
    command_type: &str,
    parameters: Value,
) -> Result<(DeviceCommand, WebhookControlStatus), Error> {
    let mut command = create_command(pool, device.id, command_type, &parameters).await?;

    // A dead channel is released by `send_to_*` itself (comparing against
    // the sender it just used), so a connection that has since superseded
    // the dead one is never evicted here.
    let sent = match device.client_id {
        Some(client_id) => {
            let envelope = client_envelope(device.id, &command);
            registry.send_to_client(client_id, envelope).await
        }
        None => {
            let envelope = device_envelope(&command);
            registry.send_to_device(device.id, envelope).await
        }
    };

    if sent {
        command = mark_sent(pool, command.id).await?;
        metrics::COMMANDS_DISPATCHED_TOTAL.with_label_values(&["sent"]).inc();
        Ok((command, WebhookControlStatus::Sent))
    } else {
        metrics::COMMANDS_DISPATCHED_TOTAL.with_label_values(&["pending"]).inc();
        Ok((command, WebhookControlStatus::Pending))
    }
}

pub async fn mark_sent(pool: &PgPool, command_id: Uuid) -> Result<DeviceCommand, Error> {
    let command = sqlx::query_as(
        "UPDATE device_commands SET status = 'sent', sent_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(command_id)
    .fetch_one(pool)
    .await?;
    Ok(command)
}

/// Returns `Ok(None)` for an unknown `command_id` — per §4.6 the caller logs
/// and drops the reply rather than treating it as an error.
pub async fn mark_completed(
    pool: &PgPool,
    command_id: Uuid,
    result: Option<Value>,
) -> Result<Option<DeviceCommand>, Error> {
    let command = sqlx::query_as(
        "UPDATE device_commands SET status = 'completed', result = $2, completed_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(command_id)
    .bind(result.unwrap_or_else(|| json!({})))
    .fetch_optional(pool)
    .await?;
    Ok(command)
}

pub async fn mark_failed(
    pool: &PgPool,
    command_id: Uuid,
    error_message: &str,
) -> Result<Option<DeviceCommand>, Error> {
    let command = sqlx::query_as(
        "UPDATE device_commands SET status = 'failed', error_message = $2, completed_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(command_id)
    .bind(error_message)
    .fetch_optional(pool)
    .await?;
    Ok(command)
}

/// Delivers every pending command for a direct device agent that just
/// connected, oldest first. Stops at the first failed send — the channel
/// just died, so the rest would fail too.
pub async fn replay_pending_for_device(
    pool: &PgPool,
    registry: &DeviceRegistry,
    device_id: Uuid,
) -> Result<usize, Error> {
    let pending: Vec<DeviceCommand> = sqlx::query_as(
        "SELECT * FROM device_commands WHERE device_id = $1 AND status = 'pending' ORDER BY created_at ASC",
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;

    let mut sent_count = 0;
    for command in pending {
        let envelope = device_envelope(&command);
        if !registry.send_to_device(device_id, envelope).await {
            break;
        }
        mark_sent(pool, command.id).await?;
        sent_count += 1;
    }
    Ok(sent_count)
}

/// Same as `replay_pending_for_device`, across every device bound to a host
/// client (§4.6 "for a host client: the same, but across all devices
/// currently bound to that client").
pub async fn replay_pending_for_client(
    pool: &PgPool,
    registry: &DeviceRegistry,
    client_id: Uuid,
) -> Result<usize, Error> {
    let pending: Vec<DeviceCommand> = sqlx::query_as(
        "SELECT dc.* FROM device_commands dc
         JOIN devices d ON d.id = dc.device_id
         WHERE d.client_id = $1 AND dc.status = 'pending'
         ORDER BY dc.created_at ASC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    let mut sent_count = 0;
    for command in pending {
        let envelope = client_envelope(command.device_id, &command);
        if !registry.send_to_client(client_id, envelope).await {
            break;
        }
        mark_sent(pool, command.id).await?;
        sent_count += 1;
    }
    Ok(sent_count)
}

fn device_envelope(command: &DeviceCommand) -> Value {
    json!({
        "command_id": command.id,
        "command_type": command.command_type,
        "parameters": command.parameters,
    })
}

fn client_envelope(device_id: Uuid, command: &DeviceCommand) -> Value {
    json!({
        "type": "device_command",
        "command_id": command.id,
        "device_id": device_id,
        "command_type": command.command_type,
        "parameters": command.parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pipeline_domain::command::CommandStatus;

    fn sample_command() -> DeviceCommand {
        DeviceCommand {
            id: Uuid::new_v4(),
            device_id: Uuid::new_v4(),
            command_type: "turn_on".to_string(),
            parameters: json!({"brightness": 80}),
            status: CommandStatus::Pending,
            result: None,
            error_message: None,
            created_at: Utc::now(),
            sent_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_device_envelope_has_no_type_tag() {
        let command = sample_command();
        let envelope = device_envelope(&command);
        assert_eq!(envelope["command_id"], json!(command.id));
        assert_eq!(envelope["command_type"], "turn_on");
        assert!(envelope.get("type").is_none());
    }

    #[test]
    fn test_client_envelope_carries_device_id_and_type_tag() {
        let command = sample_command();
        let device_id = Uuid::new_v4();
        let envelope = client_envelope(device_id, &command);
        assert_eq!(envelope["type"], "device_command");
        assert_eq!(envelope["device_id"], json!(device_id));
        assert_eq!(envelope["command_id"], json!(command.id));
    }
}
