/*!
 * Rule Consumer
 *
 * Discovers tenants with active rules, reads their event streams by cursor,
 * and evaluates each entry against that tenant's active rules (§4.3). The
 * loop shape is grounded on the reference message processor's per-stream
 * `process_stream_loop`, generalized from a fixed per-chain stream set to a
 * dynamically discovered per-tenant one.
 */

use pipeline_common::broker::Broker;
use pipeline_common::Error;
use pipeline_domain::event::{Event, EventKind};
use pipeline_domain::rule::{Action, Condition, Rule};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::condition::evaluate_rule;
use crate::executor::{run_actions, ExecutorContext};
use crate::metrics;

pub struct ConsumerContext {
    pub pool: PgPool,
    pub broker: Broker,
    pub http: reqwest::Client,
    pub device_service_url: String,
    pub read_count: usize,
    pub block_time_ms: usize,
    pub webhook_deadline: Duration,
    pub device_control_deadline: Duration,
}

/// Runs until `shutdown` fires. Between iterations, re-discovers the active
/// tenant set and advances an in-memory cursor per stream (§4.3 step 1-2).
pub async fn run(mut ctx: ConsumerContext, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
    let mut cursors: HashMap<String, String> = HashMap::new();

    loop {
        if shutdown.try_recv().is_ok() {
            info!("rule consumer shutting down");
            return;
        }

        let tenants = match discover_active_tenants(&ctx.pool).await {
            Ok(tenants) => tenants,
            Err(e) => {
                error!("failed to discover active tenants: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        for tenant in &tenants {
            let stream_key = format!("tiktok:events:{tenant}");
            cursors.entry(stream_key).or_insert_with(|| "0".to_string());
        }

        let read_set: Vec<(&str, &str)> = cursors
            .iter()
            .map(|(stream, id)| (stream.as_str(), id.as_str()))
            .collect();

        let batches = match ctx
            .broker
            .read_multi(&read_set, ctx.read_count, ctx.block_time_ms)
            .await
        {
            Ok(batches) => batches,
            Err(e) => {
                error!("failed to read event streams: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        for batch in batches {
            let tenant = batch
                .stream
                .strip_prefix("tiktok:events:")
                .unwrap_or(&batch.stream)
                .to_string();

            metrics::EVENTS_CONSUMED_TOTAL
                .with_label_values(&[&tenant])
                .inc_by(batch.entries.len() as u64);

            for entry in &batch.entries {
                let event: Event = match serde_json::from_value(entry.data.clone()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(%tenant, "failed to parse stream entry {}: {e}", entry.id);
                        cursors.insert(batch.stream.clone(), entry.id.clone());
                        continue;
                    }
                };

                if let Err(e) = evaluate_event(&mut ctx, &tenant, &event, &entry.id).await {
                    error!(%tenant, "failed to fetch rules for event: {e}");
                }

                cursors.insert(batch.stream.clone(), entry.id.clone());
            }
        }
    }
}

async fn discover_active_tenants(pool: &PgPool) -> Result<Vec<String>, Error> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT tenant FROM rules WHERE status = 'active'")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(t,)| t).collect())
}

async fn evaluate_event(
    ctx: &mut ConsumerContext,
    tenant: &str,
    event: &Event,
    event_id: &str,
) -> Result<(), Error> {
    let rules = fetch_active_rules(&ctx.pool, tenant, event.event_kind).await?;

    for rule in rules {
        if let Some(session_filter) = rule.session_filter {
            if session_filter != event.session {
                continue;
            }
        }

        let conditions = match fetch_conditions(&ctx.pool, rule.id).await {
            Ok(c) => c,
            Err(e) => {
                warn!(rule_id = %rule.id, "failed to load conditions, skipping rule: {e}");
                continue;
            }
        };

        if !evaluate_rule(&conditions, rule.logic, event) {
            continue;
        }

        metrics::RULES_MATCHED_TOTAL
            .with_label_values(&[tenant, &event.event_kind.to_string()])
            .inc();

        let actions = match fetch_actions(&ctx.pool, rule.id).await {
            Ok(a) => a,
            Err(e) => {
                warn!(rule_id = %rule.id, "failed to load actions, skipping rule: {e}");
                continue;
            }
        };

        let executor_ctx = ExecutorContext {
            pool: &ctx.pool,
            http: &ctx.http,
            device_service_url: &ctx.device_service_url,
            webhook_deadline: ctx.webhook_deadline,
            device_control_deadline: ctx.device_control_deadline,
        };
        run_actions(&executor_ctx, rule.id, &actions, event, event_id).await;
        debug!(rule_id = %rule.id, %tenant, "rule matched and executed");
    }

    Ok(())
}

async fn fetch_active_rules(
    pool: &PgPool,
    tenant: &str,
    event_kind: EventKind,
) -> Result<Vec<Rule>, Error> {
    let rules = sqlx::query_as(
        "SELECT * FROM rules WHERE tenant = $1 AND status = 'active' AND event_kind = $2",
    )
    .bind(tenant)
    .bind(event_kind)
    .fetch_all(pool)
    .await?;
    Ok(rules)
}

async fn fetch_conditions(pool: &PgPool, rule_id: uuid::Uuid) -> Result<Vec<Condition>, Error> {
    let conditions =
        sqlx::query_as("SELECT * FROM rule_conditions WHERE rule_id = $1 ORDER BY \"order\"")
            .bind(rule_id)
            .fetch_all(pool)
            .await?;
    Ok(conditions)
}

async fn fetch_actions(pool: &PgPool, rule_id: uuid::Uuid) -> Result<Vec<Action>, Error> {
    let actions =
        sqlx::query_as("SELECT * FROM rule_actions WHERE rule_id = $1 ORDER BY \"order\"")
            .bind(rule_id)
            .fetch_all(pool)
            .await?;
    Ok(actions)
}
