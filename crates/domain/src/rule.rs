use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::event::EventKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Draft,
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "lowercase")]
pub enum RuleLogic {
    And,
    Or,
}

/// Tenant-authored trigger: an `event_kind` plus optional session filter,
/// an ordered list of conditions, and an ordered list of actions.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Rule {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub description: Option<String>,
    pub status: RuleStatus,
    pub event_kind: EventKind,
    pub session_filter: Option<Uuid>,
    pub logic: RuleLogic,
    pub exec_count: i64,
    pub last_exec_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[sqlx(rename = "==")]
    #[serde(rename = "==")]
    Eq,
    #[sqlx(rename = "!=")]
    #[serde(rename = "!=")]
    Ne,
    #[sqlx(rename = ">")]
    #[serde(rename = ">")]
    Gt,
    #[sqlx(rename = ">=")]
    #[serde(rename = ">=")]
    Gte,
    #[sqlx(rename = "<")]
    #[serde(rename = "<")]
    Lt,
    #[sqlx(rename = "<=")]
    #[serde(rename = "<=")]
    Lte,
    Contains,
    NotContains,
    In,
    NotIn,
}

/// A single boolean predicate against one field of an event payload.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Condition {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub field: String,
    pub operator: Operator,
    pub value: String,
    pub order: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DeviceControl,
    Notification,
    Webhook,
    Log,
}

/// A side-effect to perform when a rule matches.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Action {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub kind: ActionKind,
    pub config: Value,
    pub order: i32,
}

// --- REST request/response DTOs (§6) ---

#[derive(Debug, Validate, Deserialize)]
pub struct ConditionInput {
    #[validate(length(min = 1, max = 255))]
    pub field: String,
    pub operator: Operator,
    pub value: String,
    pub order: i32,
}

#[derive(Debug, Validate, Deserialize)]
pub struct ActionInput {
    #[serde(rename = "action_type")]
    pub kind: ActionKind,
    pub config: Value,
    pub order: i32,
}

#[derive(Debug, Validate, Deserialize)]
pub struct CreateRuleRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: Option<String>,
    pub event_type: EventKind,
    pub livestream_id: Option<Uuid>,
    pub logic_operator: RuleLogic,
    #[validate(nested)]
    pub conditions: Vec<ConditionInput>,
    #[validate(nested)]
    pub actions: Vec<ActionInput>,
}

#[derive(Debug, Serialize)]
pub struct RuleResponse {
    pub id: Uuid,
    pub tenant: String,
    pub name: String,
    pub description: Option<String>,
    pub status: RuleStatus,
    pub event_kind: EventKind,
    pub session_filter: Option<Uuid>,
    pub logic: RuleLogic,
    pub exec_count: i64,
    pub last_exec_at: Option<DateTime<Utc>>,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    pub fn into_response(self, conditions: Vec<Condition>, actions: Vec<Action>) -> RuleResponse {
        RuleResponse {
            id: self.id,
            tenant: self.tenant,
            name: self.name,
            description: self.description,
            status: self.status,
            event_kind: self.event_kind,
            session_filter: self.session_filter,
            logic: self.logic,
            exec_count: self.exec_count,
            last_exec_at: self.last_exec_at,
            conditions,
            actions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
