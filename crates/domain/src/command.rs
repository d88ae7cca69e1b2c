use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Completed,
    Failed,
}

/// A durable record of an intent to act on a device, with a strict status
/// lifecycle `pending -> sent -> (completed | failed)` (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceCommand {
    pub id: Uuid,
    pub device_id: Uuid,
    pub command_type: String,
    pub parameters: Value,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Validate, Deserialize)]
pub struct ControlDeviceRequest {
    #[validate(length(min = 1, max = 100))]
    pub command_type: String,
    pub parameters: Option<Value>,
}

/// Body of the internal webhook the Action Executor calls (§4.6).
#[derive(Debug, Deserialize)]
pub struct WebhookControlRequest {
    pub workspace_id: String,
    pub device_id: Uuid,
    pub command_type: String,
    pub parameters: Value,
}

#[derive(Debug, Serialize)]
pub struct DeviceCommandResponse {
    pub id: Uuid,
    pub device_id: Uuid,
    pub command_type: String,
    pub parameters: Value,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<DeviceCommand> for DeviceCommandResponse {
    fn from(c: DeviceCommand) -> Self {
        Self {
            id: c.id,
            device_id: c.device_id,
            command_type: c.command_type,
            parameters: c.parameters,
            status: c.status,
            result: c.result,
            error_message: c.error_message,
            created_at: c.created_at,
            sent_at: c.sent_at,
            completed_at: c.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookControlResponse {
    pub command_id: Uuid,
    pub status: WebhookControlStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookControlStatus {
    Sent,
    Pending,
}
