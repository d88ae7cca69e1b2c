/*!
 * Action Executor
 *
 * Runs a matched rule's actions in order, persists the audit row, and bumps
 * the rule's running counters (§4.4). Outbound HTTP shares one
 * `reqwest::Client` per process, matching the reference delivery worker's
 * one-client-per-process idiom.
 */

use pipeline_domain::event::Event;
use pipeline_domain::execution::ExecutionStatus;
use pipeline_domain::rule::{Action, ActionKind};
use serde_json::Value;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;

pub struct ExecutorContext<'a> {
    pub pool: &'a PgPool,
    pub http: &'a reqwest::Client,
    pub device_service_url: &'a str,
    pub webhook_deadline: Duration,
    pub device_control_deadline: Duration,
}

/// Run every action of `rule_id` against `event`, persist the audit row, and
/// bump `exec_count`/`last_exec_at`. `event_id` is the broker-assigned
/// stream entry id.
pub async fn run_actions(
    ctx: &ExecutorContext<'_>,
    rule_id: Uuid,
    actions: &[Action],
    event: &Event,
    event_id: &str,
) {
    let started = Instant::now();
    let start_timestamp = chrono::Utc::now();

    let mut ordered: Vec<&Action> = actions.iter().collect();
    ordered.sort_by_key(|a| a.order);

    let mut succeeded = 0i32;
    let mut failed = 0i32;
    let mut last_error: Option<String> = None;

    for action in ordered {
        let config = substitute_templates(&action.config, event);
        let outcome = dispatch(ctx, action.kind, &config, event).await;
        match outcome {
            Ok(()) => {
                succeeded += 1;
                metrics::ACTIONS_EXECUTED_TOTAL
                    .with_label_values(&[action_kind_label(action.kind), "success"])
                    .inc();
            }
            Err(e) => {
                warn!(%rule_id, action_id = %action.id, "action failed: {e}");
                failed += 1;
                last_error = Some(e);
                metrics::ACTIONS_EXECUTED_TOTAL
                    .with_label_values(&[action_kind_label(action.kind), "failure"])
                    .inc();
            }
        }
    }

    let total = succeeded + failed;
    let status = if failed == 0 {
        ExecutionStatus::Success
    } else if succeeded == 0 && total > 0 {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Partial
    };

    let duration_ms = started.elapsed().as_millis() as i32;
    let event_data = serde_json::to_value(event).unwrap_or(Value::Null);

    if let Err(e) = persist_execution(
        ctx.pool,
        rule_id,
        event_id,
        event.event_kind,
        &event_data,
        status,
        succeeded,
        failed,
        last_error.as_deref(),
        duration_ms,
        start_timestamp,
    )
    .await
    {
        error!(%rule_id, "failed to persist rule execution: {e}");
    }
}

#[allow(clippy::too_many_arguments)]
async fn persist_execution(
    pool: &PgPool,
    rule_id: Uuid,
    event_id: &str,
    event_kind: pipeline_domain::event::EventKind,
    event_data: &Value,
    status: ExecutionStatus,
    succeeded: i32,
    failed: i32,
    error_message: Option<&str>,
    duration_ms: i32,
    executed_at: chrono::DateTime<chrono::Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO rule_executions
            (id, rule_id, event_id, event_kind, event_data, status, actions_executed,
             actions_failed, error_message, executed_at, duration_ms)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(Uuid::new_v4())
    .bind(rule_id)
    .bind(event_id)
    .bind(event_kind)
    .bind(event_data)
    .bind(status)
    .bind(succeeded)
    .bind(failed)
    .bind(error_message)
    .bind(executed_at)
    .bind(duration_ms)
    .execute(pool)
    .await?;

    sqlx::query(
        "UPDATE rules SET exec_count = exec_count + 1, last_exec_at = $2 WHERE id = $1",
    )
    .bind(rule_id)
    .bind(executed_at)
    .execute(pool)
    .await?;

    Ok(())
}

async fn dispatch(
    ctx: &ExecutorContext<'_>,
    kind: ActionKind,
    config: &Value,
    event: &Event,
) -> Result<(), String> {
    match kind {
        ActionKind::Log => {
            let message = config
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("(no message)");
            info!(target: "rule_action", "{message}");
            Ok(())
        }
        ActionKind::Notification => {
            info!(target: "rule_action", config = %config, "notification handoff (stub)");
            Ok(())
        }
        ActionKind::Webhook => dispatch_webhook(ctx, config).await,
        ActionKind::DeviceControl => dispatch_device_control(ctx, config, event).await,
    }
}

async fn dispatch_webhook(ctx: &ExecutorContext<'_>, config: &Value) -> Result<(), String> {
    let url = config
        .get("url")
        .and_then(Value::as_str)
        .ok_or("webhook action missing url")?;
    let method = config
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or("POST")
        .to_uppercase();
    let body = config.get("body").cloned().unwrap_or(Value::Null);

    let mut builder = ctx
        .http
        .request(
            method.parse().map_err(|_| format!("invalid method {method}"))?,
            url,
        )
        .timeout(ctx.webhook_deadline)
        .json(&body);

    if let Some(headers) = config.get("headers").and_then(Value::as_object) {
        for (key, value) in headers {
            if let Some(value) = value.as_str() {
                builder = builder.header(key, value);
            }
        }
    }

    let response = builder.send().await.map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("webhook returned {}", response.status()))
    }
}

async fn dispatch_device_control(
    ctx: &ExecutorContext<'_>,
    config: &Value,
    event: &Event,
) -> Result<(), String> {
    let device_id = config
        .get("device_id")
        .and_then(Value::as_str)
        .ok_or("device_control action missing device_id")?;
    let command_type = config
        .get("command_type")
        .and_then(Value::as_str)
        .ok_or("device_control action missing command_type")?;
    let parameters = config.get("parameters").cloned().unwrap_or(Value::Null);

    let url = format!("{}/api/webhook/control", ctx.device_service_url);
    let body = serde_json::json!({
        "workspace_id": event.tenant,
        "device_id": device_id,
        "command_type": command_type,
        "parameters": parameters,
    });

    let response = ctx
        .http
        .post(&url)
        .timeout(ctx.device_control_deadline)
        .json(&body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("device control call returned {}", response.status()))
    }
}

fn action_kind_label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Log => "log",
        ActionKind::Notification => "notification",
        ActionKind::Webhook => "webhook",
        ActionKind::DeviceControl => "device_control",
    }
}

/// Replace every `{{field}}` occurrence in string values of `config` with
/// the stringified value of `event[field]`. Missing fields leave the
/// literal placeholder in place (§4.4).
pub fn substitute_templates(config: &Value, event: &Event) -> Value {
    match config {
        Value::String(s) => Value::String(substitute_in_string(s, event)),
        Value::Array(items) => Value::Array(
            items.iter().map(|v| substitute_templates(v, event)).collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_templates(v, event)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn substitute_in_string(input: &str, event: &Event) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let field = after_open[..end].trim();
        match event.get_field(field) {
            Some(value) => output.push_str(&stringify(&value)),
            None => output.push_str(&format!("{{{{{field}}}}}")),
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    output
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::event::EventKind;

    #[test]
    fn test_substitute_replaces_known_field() {
        let event = Event::new(EventKind::Comment, "tenant-a".to_string(), Uuid::new_v4())
            .with_field("comment", "hello world");
        let config = serde_json::json!({ "message": "got comment: {{comment}}" });
        let out = substitute_templates(&config, &event);
        assert_eq!(out["message"], "got comment: hello world");
    }

    #[test]
    fn test_substitute_leaves_missing_field_placeholder() {
        let event = Event::new(EventKind::Comment, "tenant-a".to_string(), Uuid::new_v4());
        let config = serde_json::json!({ "message": "value: {{nonexistent}}" });
        let out = substitute_templates(&config, &event);
        assert_eq!(out["message"], "value: {{nonexistent}}");
    }

    #[test]
    fn test_substitute_recurses_into_nested_objects() {
        let event = Event::new(EventKind::Gift, "tenant-a".to_string(), Uuid::new_v4())
            .with_field("gift_name", "rose");
        let config = serde_json::json!({ "body": { "text": "gift: {{gift_name}}" } });
        let out = substitute_templates(&config, &event);
        assert_eq!(out["body"]["text"], "gift: rose");
    }
}
