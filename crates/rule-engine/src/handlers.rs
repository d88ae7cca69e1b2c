/*!
 * Rule REST CRUD (§6 "Rule Engine service")
 */

use axum::extract::{Path, State};
use axum::Json;
use pipeline_common::{AuthContext, Error};
use pipeline_domain::execution::RuleExecution;
use pipeline_domain::rule::{
    Action, Condition, CreateRuleRequest, Rule, RuleResponse, RuleStatus,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

pub async fn create_rule(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<RuleResponse>, Error> {
    req.validate().map_err(|e| Error::Validation(e.to_string()))?;

    let mut tx = state.pool.begin().await?;

    let rule_id = Uuid::new_v4();
    let rule: Rule = sqlx::query_as(
        "INSERT INTO rules
            (id, tenant, name, description, status, event_kind, session_filter, logic, exec_count)
         VALUES ($1, $2, $3, $4, 'draft', $5, $6, $7, 0)
         RETURNING *",
    )
    .bind(rule_id)
    .bind(&auth.tenant)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.event_type)
    .bind(req.livestream_id)
    .bind(req.logic_operator)
    .fetch_one(&mut *tx)
    .await?;

    let mut conditions = Vec::with_capacity(req.conditions.len());
    for c in &req.conditions {
        let condition: Condition = sqlx::query_as(
            "INSERT INTO rule_conditions (id, rule_id, field, operator, value, \"order\")
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(rule_id)
        .bind(&c.field)
        .bind(c.operator.clone())
        .bind(&c.value)
        .bind(c.order)
        .fetch_one(&mut *tx)
        .await?;
        conditions.push(condition);
    }

    let mut actions = Vec::with_capacity(req.actions.len());
    for a in &req.actions {
        let action: Action = sqlx::query_as(
            "INSERT INTO rule_actions (id, rule_id, kind, config, \"order\")
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(rule_id)
        .bind(a.kind)
        .bind(&a.config)
        .bind(a.order)
        .fetch_one(&mut *tx)
        .await?;
        actions.push(action);
    }

    tx.commit().await?;

    Ok(Json(rule.into_response(conditions, actions)))
}

pub async fn list_rules(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<RuleResponse>>, Error> {
    let rules: Vec<Rule> = sqlx::query_as("SELECT * FROM rules WHERE tenant = $1 ORDER BY created_at DESC")
        .bind(&auth.tenant)
        .fetch_all(&state.pool)
        .await?;

    let mut responses = Vec::with_capacity(rules.len());
    for rule in rules {
        let (conditions, actions) = fetch_children(&state.pool, rule.id).await?;
        responses.push(rule.into_response(conditions, actions));
    }
    Ok(Json(responses))
}

pub async fn get_rule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RuleResponse>, Error> {
    let rule = fetch_rule(&state.pool, rule_id, &auth.tenant).await?;
    let (conditions, actions) = fetch_children(&state.pool, rule.id).await?;
    Ok(Json(rule.into_response(conditions, actions)))
}

pub async fn activate_rule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RuleResponse>, Error> {
    set_status(&state.pool, rule_id, &auth.tenant, RuleStatus::Active).await
}

pub async fn deactivate_rule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<RuleResponse>, Error> {
    set_status(&state.pool, rule_id, &auth.tenant, RuleStatus::Inactive).await
}

pub async fn delete_rule(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    fetch_rule(&state.pool, rule_id, &auth.tenant).await?;

    sqlx::query("DELETE FROM rules WHERE id = $1")
        .bind(rule_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(serde_json::json!({ "deleted": rule_id })))
}

pub async fn list_executions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(rule_id): Path<Uuid>,
) -> Result<Json<Vec<RuleExecution>>, Error> {
    fetch_rule(&state.pool, rule_id, &auth.tenant).await?;

    let executions = sqlx::query_as(
        "SELECT * FROM rule_executions WHERE rule_id = $1 ORDER BY executed_at DESC LIMIT 50",
    )
    .bind(rule_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(executions))
}

async fn set_status(
    pool: &PgPool,
    rule_id: Uuid,
    tenant: &str,
    status: RuleStatus,
) -> Result<Json<RuleResponse>, Error> {
    fetch_rule(pool, rule_id, tenant).await?;

    let rule: Rule = sqlx::query_as(
        "UPDATE rules SET status = $1, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(status)
    .bind(rule_id)
    .fetch_one(pool)
    .await?;

    let (conditions, actions) = fetch_children(pool, rule.id).await?;
    Ok(Json(rule.into_response(conditions, actions)))
}

async fn fetch_rule(pool: &PgPool, rule_id: Uuid, tenant: &str) -> Result<Rule, Error> {
    sqlx::query_as("SELECT * FROM rules WHERE id = $1 AND tenant = $2")
        .bind(rule_id)
        .bind(tenant)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("rule {rule_id} not found")))
}

async fn fetch_children(
    pool: &PgPool,
    rule_id: Uuid,
) -> Result<(Vec<Condition>, Vec<Action>), Error> {
    let conditions =
        sqlx::query_as("SELECT * FROM rule_conditions WHERE rule_id = $1 ORDER BY \"order\"")
            .bind(rule_id)
            .fetch_all(pool)
            .await?;
    let actions = sqlx::query_as("SELECT * FROM rule_actions WHERE rule_id = $1 ORDER BY \"order\"")
        .bind(rule_id)
        .fetch_all(pool)
        .await?;
    Ok((conditions, actions))
}
