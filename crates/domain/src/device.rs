use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
    Error,
}

/// A physical or virtual device, identified by a hashed high-entropy agent
/// token (§4.5). The plain token is returned exactly once, at creation.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub kind: String,
    pub status: AgentStatus,
    pub agent_token_hash: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub client_id: Option<Uuid>,
    pub connection_type: Option<String>,
    pub connection_params: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A desktop/laptop process that owns zero or more devices and relays
/// commands to them (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HostClient {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub client_type: Option<String>,
    pub os: Option<String>,
    pub version: Option<String>,
    pub status: AgentStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

// --- REST request/response DTOs (§6) ---

#[derive(Debug, Validate, Deserialize)]
pub struct CreateDeviceRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub device_type: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Validate, Deserialize)]
pub struct UpdateDeviceRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub kind: String,
    pub status: AgentStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Device> for DeviceResponse {
    fn from(d: Device) -> Self {
        Self {
            id: d.id,
            tenant: d.tenant,
            name: d.name,
            kind: d.kind,
            status: d.status,
            last_seen: d.last_seen,
            metadata: d.metadata,
            client_id: d.client_id,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Creation response carrying the plain agent token. This is the only
/// response shape in the whole API that ever contains the plain token
/// (Invariant 5) — every other device read goes through `DeviceResponse`.
#[derive(Debug, Serialize)]
pub struct DeviceWithTokenResponse {
    #[serde(flatten)]
    pub device: DeviceResponse,
    pub agent_token: String,
}

#[derive(Debug, Validate, Deserialize)]
pub struct RegisterClientRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub client_type: Option<String>,
    pub os: Option<String>,
    pub version: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RegisterClientResponse {
    pub client_id: Uuid,
    pub client_token: String,
    pub tenant: String,
}

#[derive(Debug, Validate, Deserialize)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub client_type: Option<String>,
    pub os: Option<String>,
    pub version: Option<String>,
    pub status: AgentStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<HostClient> for ClientResponse {
    fn from(c: HostClient) -> Self {
        Self {
            id: c.id,
            tenant: c.tenant,
            name: c.name,
            client_type: c.client_type,
            os: c.os,
            version: c.version,
            status: c.status,
            last_seen: c.last_seen,
            metadata: c.metadata,
            created_at: c.created_at,
        }
    }
}
