use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::event::EventKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Partial,
    Failed,
}

/// Append-only audit row for one invocation of a rule's action list against
/// one event (§3, §4.4). Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RuleExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub event_id: String,
    pub event_kind: EventKind,
    pub event_data: Value,
    pub status: ExecutionStatus,
    pub actions_executed: i32,
    pub actions_failed: i32,
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i32,
}
