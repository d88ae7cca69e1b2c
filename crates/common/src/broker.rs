//! Event broker client (Redis Streams)
//!
//! Wraps the per-tenant append-only stream the three services share: the
//! ingestor appends, the rule consumer reads by cursor, and (for any
//! consumer that wants durability across restarts) consumer-group primitives
//! are available even though the rule consumer does not use them by default.
//!
//! Java equivalent:
//! ```java
//! JedisPool pool = new JedisPool("localhost", 6379);
//! Jedis jedis = pool.getResource();
//! ```

use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::error::Result;

/// A single entry read back from a stream: its broker-assigned id and the
/// JSON event payload stored under it.
#[derive(Debug, Clone)]
pub struct BrokerEntry {
    pub id: String,
    pub data: Json,
}

/// Entries returned for one stream out of a multi-stream read.
#[derive(Debug, Clone)]
pub struct StreamBatch {
    pub stream: String,
    pub entries: Vec<BrokerEntry>,
}

/// Event broker client wrapping a single Redis connection manager.
///
/// Rust:
/// ```rust
/// let broker = Broker::connect("redis://localhost:6379").await?;
/// ```
pub struct Broker {
    conn: ConnectionManager,
}

impl Broker {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to event broker at {}", redis_url);
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Event broker connection established");
        Ok(Self { conn })
    }

    pub async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    /// Append one event onto `stream`, trimming the stream to approximately
    /// `maxlen` entries (oldest first). Returns the broker-assigned id.
    pub async fn append(&mut self, stream: &str, event: &Json, maxlen: usize) -> Result<String> {
        let payload = serde_json::to_string(event)?;

        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("MAXLEN")
            .arg("~")
            .arg(maxlen)
            .arg("*")
            .arg("data")
            .arg(payload)
            .query_async(&mut self.conn)
            .await?;

        Ok(id)
    }

    /// Blocking read across several streams at once, each starting from its
    /// own cursor. `block_ms = 0` means block forever; the rule consumer
    /// uses a short finite block so it can still observe shutdown between
    /// iterations.
    pub async fn read_multi(
        &mut self,
        cursors: &[(&str, &str)],
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamBatch>> {
        if cursors.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XREAD");
        cmd.arg("COUNT").arg(count).arg("BLOCK").arg(block_ms).arg("STREAMS");
        for (stream, _) in cursors {
            cmd.arg(stream);
        }
        for (_, id) in cursors {
            cmd.arg(id);
        }

        let response: redis::Value = cmd.query_async(&mut self.conn).await?;
        Ok(parse_stream_response(response))
    }

    /// Idempotent consumer-group creation. Tolerates `BUSYGROUP` (group
    /// already exists) as success, per the broker contract in §4.2.
    pub async fn ensure_group(&mut self, stream: &str, group: &str) -> Result<()> {
        let result: std::result::Result<String, RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group '{}' already exists on '{}'", group, stream);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read never-delivered entries for `(group, consumer)`.
    pub async fn read_group(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<BrokerEntry>> {
        let response: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut self.conn)
            .await?;

        Ok(parse_stream_response(response)
            .into_iter()
            .find(|b| b.stream == stream)
            .map(|b| b.entries)
            .unwrap_or_default())
    }

    pub async fn ack(&mut self, stream: &str, group: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream).arg(group);
        for id in ids {
            cmd.arg(id);
        }
        let _: usize = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    /// Number of delivered-but-unacknowledged entries for `(stream, group)`.
    pub async fn pending_count(&mut self, stream: &str, group: &str) -> Result<usize> {
        type XPendingSummary = (usize, Option<String>, Option<String>, Option<Vec<(String, usize)>>);
        let result: XPendingSummary = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .query_async(&mut self.conn)
            .await?;
        Ok(result.0)
    }
}

/// Parses the nested `Bulk` tree XREAD/XREADGROUP return into typed batches.
fn parse_stream_response(response: redis::Value) -> Vec<StreamBatch> {
    let mut batches = Vec::new();

    let streams = match response {
        redis::Value::Bulk(streams) => streams,
        _ => return batches,
    };

    for stream_data in streams {
        let parts = match stream_data {
            redis::Value::Bulk(parts) if parts.len() >= 2 => parts,
            _ => continue,
        };

        let stream_name = match &parts[0] {
            redis::Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
            _ => continue,
        };

        let messages = match &parts[1] {
            redis::Value::Bulk(messages) => messages,
            _ => continue,
        };

        let mut entries = Vec::new();
        for message in messages {
            let entry_parts = match message {
                redis::Value::Bulk(entry_parts) if entry_parts.len() >= 2 => entry_parts,
                _ => continue,
            };

            let id = match &entry_parts[0] {
                redis::Value::Data(bytes) => String::from_utf8_lossy(bytes).to_string(),
                _ => continue,
            };

            let field_data = match &entry_parts[1] {
                redis::Value::Bulk(field_data) => field_data,
                _ => continue,
            };

            let mut data = Json::Null;
            for chunk in field_data.chunks(2) {
                if chunk.len() != 2 {
                    continue;
                }
                let key = match &chunk[0] {
                    redis::Value::Data(k) => String::from_utf8_lossy(k).to_string(),
                    _ => continue,
                };
                let val = match &chunk[1] {
                    redis::Value::Data(v) => String::from_utf8_lossy(v).to_string(),
                    _ => continue,
                };
                if key == "data" {
                    data = serde_json::from_str(&val).unwrap_or_else(|_| {
                        warn!("stream entry {} had unparseable JSON payload", id);
                        Json::Null
                    });
                }
            }

            entries.push(BrokerEntry { id, data });
        }

        batches.push(StreamBatch { stream: stream_name, entries });
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires a live Redis instance
    async fn test_append_and_read() {
        if let Ok(url) = std::env::var("REDIS_URL") {
            let mut broker = Broker::connect(&url).await.unwrap();
            let event = serde_json::json!({"event_kind": "gift", "gift_name": "Rose"});
            let id = broker.append("test:stream", &event, 10_000).await.unwrap();
            assert!(!id.is_empty());

            let batches = broker
                .read_multi(&[("test:stream", "0")], 10, 100)
                .await
                .unwrap();
            assert_eq!(batches.len(), 1);
            assert!(!batches[0].entries.is_empty());
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_consumer_group_round_trip() {
        if let Ok(url) = std::env::var("REDIS_URL") {
            let mut broker = Broker::connect(&url).await.unwrap();
            broker.ensure_group("test:group-stream", "g1").await.unwrap();
            // Idempotent
            broker.ensure_group("test:group-stream", "g1").await.unwrap();
        }
    }

    #[test]
    fn test_parse_stream_response_empty() {
        let batches = parse_stream_response(redis::Value::Nil);
        assert!(batches.is_empty());
    }
}
