use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A single connection-lifecycle to an external livestream source.
///
/// Created on connect request; mutated only by the ingestor worker that
/// owns it (§4.1); terminal on disconnect or source-end.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LivestreamSession {
    pub id: Uuid,
    pub tenant: String,
    pub source_handle: String,
    pub status: SessionStatus,
    pub comment_count: i64,
    pub gift_count: i64,
    pub like_count: i64,
    pub join_count: i64,
    pub follow_count: i64,
    pub share_count: i64,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum SessionStatus {
    Connecting,
    Live,
    Disconnected,
    Error,
}

#[derive(Debug, Validate, Deserialize)]
pub struct ConnectLivestreamRequest {
    #[validate(length(min = 1, max = 255))]
    pub tiktok_input: String,
}

#[derive(Debug, Serialize)]
pub struct LivestreamSessionResponse {
    pub id: Uuid,
    pub tenant: String,
    pub source_handle: String,
    pub status: SessionStatus,
    pub comment_count: i64,
    pub gift_count: i64,
    pub like_count: i64,
    pub join_count: i64,
    pub follow_count: i64,
    pub share_count: i64,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<LivestreamSession> for LivestreamSessionResponse {
    fn from(s: LivestreamSession) -> Self {
        Self {
            id: s.id,
            tenant: s.tenant,
            source_handle: s.source_handle,
            status: s.status,
            comment_count: s.comment_count,
            gift_count: s.gift_count,
            like_count: s.like_count,
            join_count: s.join_count,
            follow_count: s.follow_count,
            share_count: s.share_count,
            connected_at: s.connected_at,
            disconnected_at: s.disconnected_at,
            created_at: s.created_at,
        }
    }
}

/// The three shapes a `tiktok_input` handle may arrive in (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceHandle {
    Username(String),
    RoomId(String),
    Url(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_request_validates_length() {
        let req = ConnectLivestreamRequest {
            tiktok_input: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
