use serde_json::Value;
use std::cmp::Ordering;

/// Returns the numeric value of a number or of a numeric looking string.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Parses strings such as `"42"`, `" 3.5"` or `"1e3"`. Leading whitespace is
/// accepted, trailing garbage is not.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let trimmed = s.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Truthiness of a value the way a loosely typed caller would expect it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Loose equality between two values.
///
/// * `null` only equals `null`.
/// * booleans compare by truthiness against anything.
/// * numbers and numeric strings compare numerically.
/// * strings compare exactly.
/// * arrays and objects compare element by element with the same rules.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(_), _) | (_, Value::Bool(_)) => is_truthy(a) == is_truthy(b),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| loose_eq(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).map(|other| loose_eq(v, other)).unwrap_or(false))
        }
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        (Value::Object(_), _) | (_, Value::Object(_)) => false,
        _ => match (numeric_value(a), numeric_value(b)) {
            (Some(x), Some(y)) => x == y,
            _ => match (a, b) {
                (Value::String(x), Value::String(y)) => x == y,
                _ => false,
            },
        },
    }
}

/// Returns true if `haystack` holds a value loosely equal to `needle`.
pub fn contains_loose(haystack: &[Value], needle: &Value) -> bool {
    haystack.iter().any(|item| loose_eq(item, needle))
}

/// Orders two values when both are numeric or both are strings.
///
/// Mixed types are not comparable and yield `None`.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (numeric_value(a), numeric_value(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

/// Renders a scalar the way it is stored in a text column.
///
/// Strings are kept verbatim, `true` becomes `"1"` and `false` the empty
/// string. Nested values are rendered as JSON. `null` has no text form.
pub fn to_plain_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) => Some(String::new()),
        Value::Number(n) => Some(n.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_strings() {
        assert_eq!(numeric_value(&json!("42")), Some(42.0));
        assert_eq!(numeric_value(&json!(" 3.5")), Some(3.5));
        assert_eq!(numeric_value(&json!("1e3")), Some(1000.0));
        assert_eq!(numeric_value(&json!("4x")), None);
        assert_eq!(numeric_value(&json!("")), None);
        assert_eq!(numeric_value(&json!("inf")), None);
        assert_eq!(numeric_value(&json!(true)), None);
    }

    #[test]
    fn test_loose_eq_numeric() {
        assert!(loose_eq(&json!(25), &json!("25")));
        assert!(loose_eq(&json!(25.0), &json!(25)));
        assert!(loose_eq(&json!("01"), &json!("1")));
        assert!(!loose_eq(&json!("abc"), &json!(0)));
    }

    #[test]
    fn test_loose_eq_null_only_null() {
        assert!(loose_eq(&json!(null), &json!(null)));
        assert!(!loose_eq(&json!(null), &json!(0)));
        assert!(!loose_eq(&json!(""), &json!(null)));
    }

    #[test]
    fn test_loose_eq_bool_truthiness() {
        assert!(loose_eq(&json!(true), &json!(1)));
        assert!(loose_eq(&json!(false), &json!("")));
        assert!(!loose_eq(&json!(true), &json!(0)));
    }

    #[test]
    fn test_loose_eq_structures() {
        assert!(loose_eq(&json!([1, "2"]), &json!(["1", 2])));
        assert!(!loose_eq(&json!([1, 2]), &json!([1])));
        assert!(loose_eq(&json!({ "a": 1 }), &json!({ "a": "1" })));
        assert!(!loose_eq(&json!({ "a": 1 }), &json!({ "b": 1 })));
        assert!(!loose_eq(&json!([1]), &json!(1)));
    }

    #[test]
    fn test_compare_values_same_type_only() {
        assert_eq!(compare_values(&json!(30), &json!(26)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!("apple"), &json!("banana")), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("apple"), &json!(3)), None);
        assert_eq!(compare_values(&json!(true), &json!(1)), None);
    }

    #[test]
    fn test_to_plain_string() {
        assert_eq!(to_plain_string(&json!("x@y.com")), Some("x@y.com".to_string()));
        assert_eq!(to_plain_string(&json!(12)), Some("12".to_string()));
        assert_eq!(to_plain_string(&json!(true)), Some("1".to_string()));
        assert_eq!(to_plain_string(&json!(false)), Some(String::new()));
        assert_eq!(to_plain_string(&json!(null)), None);
    }
}
