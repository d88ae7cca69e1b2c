use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The fixed enum of semantic event classes a livestream source can emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connect,
    Disconnect,
    LiveEnd,
    Comment,
    Gift,
    Like,
    Join,
    Follow,
    Share,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).unwrap_or(Value::Null);
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

/// A normalized event as published onto the broker (§4.1 Normalization
/// contract). Field names are stable — they become the `field` paths
/// Conditions address — so kind-specific data stays in an open `fields` map
/// rather than per-kind Rust structs with their own serde renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_kind: EventKind,
    pub tenant: String,
    pub session: Uuid,
    pub handle: Option<String>,
    pub nickname: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    pub fn new(event_kind: EventKind, tenant: impl Into<String>, session: Uuid) -> Self {
        Self {
            event_kind,
            tenant: tenant.into(),
            session,
            handle: None,
            nickname: None,
            user_id: None,
            timestamp: Utc::now(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Looks up a dotted field path against this event's JSON representation,
    /// used by Condition evaluation (§4.3). Only single-segment paths are
    /// used by the current field set, but the implementation walks arbitrary
    /// depth so nested `fields` (e.g. future structured gift metadata) work
    /// without change.
    pub fn get_field(&self, path: &str) -> Option<Value> {
        let root = serde_json::to_value(self).ok()?;
        let mut current = &root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_field_top_level() {
        let event = Event::new(EventKind::Gift, "w1", Uuid::new_v4())
            .with_field("gift_name", "Rose")
            .with_field("diamond_count", 1);

        assert_eq!(event.get_field("gift_name"), Some(Value::String("Rose".into())));
        assert_eq!(event.get_field("diamond_count"), Some(Value::from(1)));
    }

    #[test]
    fn test_get_field_missing() {
        let event = Event::new(EventKind::Like, "w1", Uuid::new_v4());
        assert_eq!(event.get_field("nonexistent"), None);
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let value = serde_json::to_value(EventKind::LiveEnd).unwrap();
        assert_eq!(value, Value::String("live_end".to_string()));
    }
}
