/*!
 * Condition Evaluation
 *
 * Evaluates a rule's conditions against an event payload (§4.3). Ported
 * from the reference evaluator's type-coercion rules: the comparison
 * operand is a plain string on the `Condition` row, coerced to match the
 * shape of the field it's compared against rather than the other way
 * around.
 */

use pipeline_domain::event::Event;
use pipeline_domain::rule::{Condition, Operator, RuleLogic};
use serde_json::Value;

/// Evaluate every condition and combine by `logic`. Vacuous (no conditions)
/// is always true — kind/session filtering already happened upstream.
pub fn evaluate_rule(conditions: &[Condition], logic: RuleLogic, event: &Event) -> bool {
    if conditions.is_empty() {
        return true;
    }

    let mut ordered: Vec<&Condition> = conditions.iter().collect();
    ordered.sort_by_key(|c| c.order);

    match logic {
        RuleLogic::And => ordered.iter().all(|c| evaluate_condition(c, event)),
        RuleLogic::Or => ordered.iter().any(|c| evaluate_condition(c, event)),
    }
}

fn evaluate_condition(condition: &Condition, event: &Event) -> bool {
    let Some(field_value) = event.get_field(&condition.field) else {
        return false;
    };
    if field_value.is_null() {
        return false;
    }

    let expected = coerce_value(&condition.value, &field_value);

    match &condition.operator {
        Operator::Eq => field_value == expected,
        Operator::Ne => field_value != expected,
        Operator::Gt => as_f64(&field_value)
            .zip(as_f64(&expected))
            .is_some_and(|(a, b)| a > b),
        Operator::Gte => as_f64(&field_value)
            .zip(as_f64(&expected))
            .is_some_and(|(a, b)| a >= b),
        Operator::Lt => as_f64(&field_value)
            .zip(as_f64(&expected))
            .is_some_and(|(a, b)| a < b),
        Operator::Lte => as_f64(&field_value)
            .zip(as_f64(&expected))
            .is_some_and(|(a, b)| a <= b),
        Operator::Contains => stringify(&field_value)
            .to_lowercase()
            .contains(&stringify(&expected).to_lowercase()),
        Operator::NotContains => !stringify(&field_value)
            .to_lowercase()
            .contains(&stringify(&expected).to_lowercase()),
        Operator::In => condition
            .value
            .split(',')
            .map(|v| v.trim())
            .any(|v| v == stringify(&field_value)),
        Operator::NotIn => !condition
            .value
            .split(',')
            .map(|v| v.trim())
            .any(|v| v == stringify(&field_value)),
    }
}

/// Coerce the condition's string operand to the type of the observed field
/// (§4.3): booleans from `{true,1,yes}` case-insensitively, integers and
/// floats parsed strictly, otherwise left as a string.
fn coerce_value(raw: &str, reference: &Value) -> Value {
    match reference {
        Value::Bool(_) => {
            Value::Bool(matches!(raw.to_lowercase().as_str(), "true" | "1" | "yes"))
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Value::Number(_) => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
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
    use uuid::Uuid;

    fn gift_event(diamond_count: i64, gift_name: &str) -> Event {
        Event::new(EventKind::Gift, "tenant-a".to_string(), Uuid::new_v4())
            .with_field("diamond_count", diamond_count)
            .with_field("gift_name", gift_name)
    }

    fn condition(field: &str, operator: Operator, value: &str) -> Condition {
        Condition {
            id: Uuid::new_v4(),
            rule_id: Uuid::new_v4(),
            field: field.to_string(),
            operator,
            value: value.to_string(),
            order: 0,
        }
    }

    #[test]
    fn test_numeric_greater_than() {
        let event = gift_event(50, "rose");
        let cond = condition("diamond_count", Operator::Gt, "10");
        assert!(evaluate_condition(&cond, &event));
    }

    #[test]
    fn test_numeric_comparison_with_non_numeric_field_is_false() {
        let event = gift_event(50, "rose");
        let cond = condition("gift_name", Operator::Gt, "10");
        assert!(!evaluate_condition(&cond, &event));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let event = gift_event(1, "Golden Rose");
        let cond = condition("gift_name", Operator::Contains, "rose");
        assert!(evaluate_condition(&cond, &event));
    }

    #[test]
    fn test_in_operator_trims_whitespace() {
        let event = gift_event(1, "rose");
        let cond = condition("gift_name", Operator::In, "lion, rose , tiger");
        assert!(evaluate_condition(&cond, &event));
    }

    #[test]
    fn test_missing_field_is_false() {
        let event = gift_event(1, "rose");
        let cond = condition("nonexistent", Operator::Eq, "x");
        assert!(!evaluate_condition(&cond, &event));
    }

    #[test]
    fn test_vacuous_conditions_are_always_true() {
        let event = gift_event(1, "rose");
        assert!(evaluate_rule(&[], RuleLogic::And, &event));
        assert!(evaluate_rule(&[], RuleLogic::Or, &event));
    }

    #[test]
    fn test_and_requires_all_true() {
        let event = gift_event(50, "rose");
        let conditions = vec![
            condition("diamond_count", Operator::Gt, "10"),
            condition("gift_name", Operator::Eq, "lion"),
        ];
        assert!(!evaluate_rule(&conditions, RuleLogic::And, &event));
    }

    #[test]
    fn test_or_requires_any_true() {
        let event = gift_event(50, "rose");
        let conditions = vec![
            condition("diamond_count", Operator::Gt, "10"),
            condition("gift_name", Operator::Eq, "lion"),
        ];
        assert!(evaluate_rule(&conditions, RuleLogic::Or, &event));
    }
}
