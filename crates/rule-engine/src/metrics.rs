use lazy_static::lazy_static;
use prometheus::{opts, register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static! {
    pub static ref EVENTS_CONSUMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("rule_engine_events_consumed_total", "Total events read from tenant streams"),
        &["tenant"]
    )
    .expect("metric can be created");

    pub static ref RULES_MATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("rule_engine_rules_matched_total", "Total rule matches"),
        &["tenant", "event_kind"]
    )
    .expect("metric can be created");

    pub static ref ACTIONS_EXECUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("rule_engine_actions_executed_total", "Total actions dispatched"),
        &["kind", "outcome"]
    )
    .expect("metric can be created");

    pub static ref RULE_EVAL_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("rule_engine_rule_eval_errors_total", "Per-rule evaluation errors"),
        &["tenant"]
    )
    .expect("metric can be created");
}

pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
