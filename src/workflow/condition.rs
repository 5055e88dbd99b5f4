//! Condition evaluation against run data
//!
//! Evaluates a single `Condition` like `amount greater_than 100` against a
//! flat data record. Total: every input produces a boolean.

use crate::config::{Condition, Operator};
use serde_json::{Map, Value};

/// Evaluate a condition against a data record
///
/// A missing field reads as undefined. Ordering operators need two numbers
/// and substring operators need two strings; any other pairing is `false`.
pub fn evaluate(condition: &Condition, data: &Map<String, Value>) -> bool {
    let actual = data.get(&condition.field);
    let expected = condition.value.as_ref();

    match condition.operator {
        Operator::Equals => strict_equals(actual, expected),
        Operator::NotEquals => !strict_equals(actual, expected),
        Operator::GreaterThan => compare_numbers(actual, expected, |a, b| a > b),
        Operator::LessThan => compare_numbers(actual, expected, |a, b| a < b),
        Operator::Contains => {
            compare_strings(actual, expected, |haystack, needle| haystack.contains(needle))
        }
        Operator::NotContains => {
            compare_strings(actual, expected, |haystack, needle| !haystack.contains(needle))
        }
        Operator::Other(_) => false,
    }
}

/// `===` over JSON values; `None` is undefined
///
/// Numbers compare numerically, so `150` and `150.0` are equal. Arrays and
/// objects have identity semantics and never compare equal to a literal.
fn strict_equals(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(Value::Null), Some(Value::Null)) => true,
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x == y,
        (Some(Value::String(x)), Some(Value::String(y))) => x == y,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => false,
    }
}

fn compare_numbers(a: Option<&Value>, b: Option<&Value>, op: impl Fn(f64, f64) -> bool) -> bool {
    match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => op(x, y),
        _ => false,
    }
}

fn compare_strings(a: Option<&Value>, b: Option<&Value>, op: impl Fn(&str, &str) -> bool) -> bool {
    match (a.and_then(Value::as_str), b.and_then(Value::as_str)) {
        (Some(x), Some(y)) => op(x, y),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_greater_than_is_strict() {
        let cond = Condition::new("amount", Operator::GreaterThan, 100);
        assert!(evaluate(&cond, &data(json!({"amount": 150}))));
        assert!(!evaluate(&cond, &data(json!({"amount": 100}))));
        assert!(evaluate(&cond, &data(json!({"amount": 100.5}))));
    }

    #[test]
    fn test_less_than() {
        let cond = Condition::new("balance", Operator::LessThan, 0);
        assert!(evaluate(&cond, &data(json!({"balance": -20}))));
        assert!(!evaluate(&cond, &data(json!({"balance": 0}))));
    }

    #[test]
    fn test_ordering_requires_numbers() {
        let cond = Condition::new("amount", Operator::GreaterThan, 100);
        assert!(!evaluate(&cond, &data(json!({"amount": "150"}))));
        assert!(!evaluate(&cond, &data(json!({"amount": null}))));
        assert!(!evaluate(&cond, &data(json!({}))));

        let cond = Condition::new("amount", Operator::LessThan, "100");
        assert!(!evaluate(&cond, &data(json!({"amount": 5}))));
    }

    #[test]
    fn test_contains() {
        let cond = Condition::new("notes", Operator::Contains, "urgent");
        assert!(evaluate(&cond, &data(json!({"notes": "This is urgent!"}))));
        assert!(!evaluate(&cond, &data(json!({"notes": "Normal task"}))));
        assert!(!evaluate(&cond, &data(json!({"notes": ["urgent"]}))));
    }

    #[test]
    fn test_not_contains_requires_strings() {
        let cond = Condition::new("notes", Operator::NotContains, "urgent");
        assert!(evaluate(&cond, &data(json!({"notes": "Normal task"}))));
        assert!(!evaluate(&cond, &data(json!({"notes": "urgent call"}))));
        // missing field is not "does not contain"
        assert!(!evaluate(&cond, &data(json!({}))));
        assert!(!evaluate(&cond, &data(json!({"notes": 42}))));
    }

    #[test]
    fn test_equals_is_strict() {
        let cond = Condition::new("status", Operator::Equals, "done");
        assert!(evaluate(&cond, &data(json!({"status": "done"}))));
        assert!(!evaluate(&cond, &data(json!({"status": "Done"}))));

        let cond = Condition::new("count", Operator::Equals, 1);
        assert!(evaluate(&cond, &data(json!({"count": 1.0}))));
        assert!(!evaluate(&cond, &data(json!({"count": "1"}))));
        assert!(!evaluate(&cond, &data(json!({"count": true}))));

        let cond = Condition::new("tags", Operator::Equals, json!(["a"]));
        assert!(!evaluate(&cond, &data(json!({"tags": ["a"]}))));
    }

    #[test]
    fn test_undefined_semantics() {
        let missing = data(json!({}));

        let cond = Condition::new("piano", Operator::Equals, "Steinway");
        assert!(!evaluate(&cond, &missing));

        let cond = Condition::new("piano", Operator::NotEquals, "Steinway");
        assert!(evaluate(&cond, &missing));

        let undefined = Condition {
            field: "piano".into(),
            operator: Operator::Equals,
            value: None,
        };
        assert!(evaluate(&undefined, &missing));
        assert!(!evaluate(&undefined, &data(json!({"piano": null}))));

        let cond = Condition::new("piano", Operator::Equals, Value::Null);
        assert!(!evaluate(&cond, &missing));
        assert!(evaluate(&cond, &data(json!({"piano": null}))));
    }

    #[test]
    fn test_unrecognized_operator() {
        let cond = Condition::new("a", Operator::Other("matches".into()), "a");
        assert!(!evaluate(&cond, &data(json!({"a": "a"}))));
    }

    #[test]
    fn test_evaluation_is_repeatable() {
        let cond = Condition::new("amount", Operator::GreaterThan, 100);
        let record = data(json!({"amount": 101, "other": {"nested": true}}));
        let first = evaluate(&cond, &record);
        for _ in 0..10 {
            assert_eq!(evaluate(&cond, &record), first);
        }
    }
}
