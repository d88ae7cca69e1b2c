/*!
 * Per-Session Ingestor Worker
 *
 * One task per `LivestreamSession` (§4.1, §5). Owns the connection to the
 * external source, normalizes its events onto `pipeline_domain::Event`,
 * bumps the session's running counters, and appends to the tenant's broker
 * stream. Publishing is synchronous with respect to the counter update so
 * the two never drift relative to each other.
 */

use pipeline_common::broker::Broker;
use pipeline_common::Error;
use pipeline_domain::event::{Event, EventKind};
use pipeline_domain::session::SourceHandle;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::metrics;
use crate::registry::WorkerCommand;
use crate::source::{LivestreamSource, SourceEvent};

/// USD-per-diamond conversion used to compute a gift's value when not part
/// of a streaking combo (§4.1 normalization contract).
const DIAMOND_TO_USD: f64 = 0.005;

pub struct WorkerContext {
    pub session_id: Uuid,
    pub tenant: String,
    pub pool: PgPool,
    pub broker: Broker,
    pub stream_maxlen: usize,
}

pub async fn run(
    ctx: WorkerContext,
    handle: SourceHandle,
    source: Arc<dyn LivestreamSource>,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    let WorkerContext {
        session_id,
        tenant,
        pool,
        mut broker,
        stream_maxlen,
    } = ctx;
    let stream_key = format!("tiktok:events:{tenant}");

    let mut conn = match source.connect(&handle).await {
        Ok(c) => c,
        Err(e) => {
            error!(%session_id, "failed to connect to external source: {e}");
            metrics::SOURCE_ERRORS_TOTAL.with_label_values(&[&tenant]).inc();
            mark_status(&pool, session_id, "error").await;
            return;
        }
    };

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                info!(%session_id, "disconnect requested: {cmd:?}");
                publish_lifecycle(&mut broker, &stream_key, stream_maxlen, session_id, &tenant, EventKind::Disconnect).await;
                mark_disconnected(&pool, session_id).await;
                return;
            }
            event = conn.next_event() => {
                match event {
                    Ok(Some(source_event)) => {
                        if let Err(e) = handle_event(
                            &pool,
                            &mut broker,
                            &stream_key,
                            stream_maxlen,
                            session_id,
                            &tenant,
                            source_event,
                        )
                        .await
                        {
                            error!(%session_id, "failed to handle source event: {e}");
                        }
                    }
                    Ok(None) => {
                        info!(%session_id, "source closed connection");
                        mark_disconnected(&pool, session_id).await;
                        return;
                    }
                    Err(e) => {
                        error!(%session_id, "source error: {e}");
                        metrics::SOURCE_ERRORS_TOTAL.with_label_values(&[&tenant]).inc();
                        mark_status(&pool, session_id, "error").await;
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_event(
    pool: &PgPool,
    broker: &mut Broker,
    stream_key: &str,
    stream_maxlen: usize,
    session_id: Uuid,
    tenant: &str,
    source_event: SourceEvent,
) -> Result<(), Error> {
    let (kind, counter_column, mut event) = normalize(session_id, tenant, source_event);

    if let Some(column) = counter_column {
        let total = bump_counter(pool, session_id, column).await?;
        if kind == EventKind::Like {
            event = event.with_field("total_likes", json!(total));
        }
    }

    match kind {
        EventKind::Connect => {
            sqlx::query(
                "UPDATE livestream_sessions SET status = 'live', connected_at = now() WHERE id = $1",
            )
            .bind(session_id)
            .execute(pool)
            .await?;
        }
        EventKind::LiveEnd => {
            sqlx::query(
                "UPDATE livestream_sessions SET status = 'disconnected', disconnected_at = now() WHERE id = $1",
            )
            .bind(session_id)
            .execute(pool)
            .await?;
        }
        _ => {}
    }

    let payload = serde_json::to_value(&event)?;
    broker.append(stream_key, &payload, stream_maxlen).await?;
    metrics::EVENTS_PUBLISHED_TOTAL
        .with_label_values(&[tenant, &kind.to_string()])
        .inc();
    Ok(())
}

async fn publish_lifecycle(
    broker: &mut Broker,
    stream_key: &str,
    stream_maxlen: usize,
    session_id: Uuid,
    tenant: &str,
    kind: EventKind,
) {
    let event = Event::new(kind, tenant.to_string(), session_id);
    match serde_json::to_value(&event) {
        Ok(payload) => {
            if let Err(e) = broker.append(stream_key, &payload, stream_maxlen).await {
                error!(%session_id, "failed to publish lifecycle event: {e}");
            }
        }
        Err(e) => error!(%session_id, "failed to serialize lifecycle event: {e}"),
    }
}

/// Normalizes a raw source event into `(kind, counter column to bump, Event)`.
fn normalize(session_id: Uuid, tenant: &str, source_event: SourceEvent) -> (EventKind, Option<&'static str>, Event) {
    match source_event {
        SourceEvent::Connect { room_id } => {
            let event = Event::new(EventKind::Connect, tenant.to_string(), session_id)
                .with_field("room_id", room_id);
            (EventKind::Connect, None, event)
        }
        SourceEvent::Disconnect => (
            EventKind::Disconnect,
            None,
            Event::new(EventKind::Disconnect, tenant.to_string(), session_id),
        ),
        SourceEvent::LiveEnd => (
            EventKind::LiveEnd,
            None,
            Event::new(EventKind::LiveEnd, tenant.to_string(), session_id),
        ),
        SourceEvent::Comment {
            user_id,
            nickname,
            comment,
        } => {
            let mut event = Event::new(EventKind::Comment, tenant.to_string(), session_id)
                .with_field("comment", comment);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Comment, Some("comment_count"), event)
        }
        SourceEvent::Gift {
            user_id,
            nickname,
            gift_name,
            diamond_count,
            gift_count,
            streaking,
        } => {
            let value_usd = if streaking {
                None
            } else {
                Some(diamond_count as f64 * gift_count as f64 * DIAMOND_TO_USD)
            };
            let mut event = Event::new(EventKind::Gift, tenant.to_string(), session_id)
                .with_field("gift_name", gift_name)
                .with_field("diamond_count", diamond_count)
                .with_field("gift_count", gift_count)
                .with_field("streaking", streaking)
                .with_field("value_usd", value_usd);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Gift, Some("gift_count"), event)
        }
        SourceEvent::Like {
            user_id,
            nickname,
            count,
        } => {
            let mut event =
                Event::new(EventKind::Like, tenant.to_string(), session_id).with_field("count", count);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Like, Some("like_count"), event)
        }
        SourceEvent::Join { user_id, nickname } => {
            let mut event = Event::new(EventKind::Join, tenant.to_string(), session_id);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Join, Some("join_count"), event)
        }
        SourceEvent::Follow { user_id, nickname } => {
            let mut event = Event::new(EventKind::Follow, tenant.to_string(), session_id);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Follow, Some("follow_count"), event)
        }
        SourceEvent::Share { user_id, nickname } => {
            let mut event = Event::new(EventKind::Share, tenant.to_string(), session_id);
            event.user_id = Some(user_id);
            event.nickname = Some(nickname);
            (EventKind::Share, Some("share_count"), event)
        }
    }
}

async fn bump_counter(pool: &PgPool, session_id: Uuid, column: &'static str) -> Result<i64, Error> {
    let sql = format!(
        "UPDATE livestream_sessions SET {column} = {column} + 1 WHERE id = $1 RETURNING {column}"
    );
    let (total,): (i64,) = sqlx::query_as(&sql).bind(session_id).fetch_one(pool).await?;
    Ok(total)
}

async fn mark_status(pool: &PgPool, session_id: Uuid, status: &str) {
    let _ = sqlx::query("UPDATE livestream_sessions SET status = $1 WHERE id = $2")
        .bind(status)
        .bind(session_id)
        .execute(pool)
        .await;
}

async fn mark_disconnected(pool: &PgPool, session_id: Uuid) {
    let _ = sqlx::query(
        "UPDATE livestream_sessions SET status = 'disconnected', disconnected_at = now() WHERE id = $1",
    )
    .bind(session_id)
    .execute(pool)
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_gift_computes_usd_value_unless_streaking() {
        let session_id = Uuid::new_v4();
        let (_, column, event) = normalize(
            session_id,
            "tenant-a",
            SourceEvent::Gift {
                user_id: "1".into(),
                nickname: "bob".into(),
                gift_name: "rose".into(),
                diamond_count: 1,
                gift_count: 10,
                streaking: false,
            },
        );
        assert_eq!(column, Some("gift_count"));
        assert_eq!(event.fields.get("value_usd").unwrap(), &json!(0.05));

        let (_, _, event) = normalize(
            session_id,
            "tenant-a",
            SourceEvent::Gift {
                user_id: "1".into(),
                nickname: "bob".into(),
                gift_name: "rose".into(),
                diamond_count: 1,
                gift_count: 10,
                streaking: true,
            },
        );
        assert_eq!(event.fields.get("value_usd").unwrap(), &json!(null));
    }

    #[test]
    fn test_normalize_comment_carries_text_field() {
        let (kind, column, event) = normalize(
            Uuid::new_v4(),
            "tenant-a",
            SourceEvent::Comment {
                user_id: "1".into(),
                nickname: "alice".into(),
                comment: "hi".into(),
            },
        );
        assert_eq!(kind, EventKind::Comment);
        assert_eq!(column, Some("comment_count"));
        assert_eq!(event.fields.get("comment").unwrap(), &json!("hi"));
    }
}
