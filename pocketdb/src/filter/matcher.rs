use crate::common::{
    compare_values, contains_loose, loose_eq, numeric_value, to_plain_string, Document,
};
use crate::filter::criteria::{Clause, Condition, Criteria, Operator};
use crate::filter::fuzzy::fuzzy_score;
use serde_json::Value;
use std::cmp::Ordering;

static NULL: Value = Value::Null;

impl Criteria {
    /// Evaluates these criteria against a decoded document.
    ///
    /// Clauses are evaluated in order and evaluation stops at the first one
    /// that fails. A field that is missing or null fails every operator except
    /// `$exists`.
    pub fn matches(&self, document: &Document) -> bool {
        self.clauses()
            .iter()
            .all(|clause| clause_matches(clause, document))
    }
}

fn clause_matches(clause: &Clause, document: &Document) -> bool {
    match clause {
        Clause::And(items) => items.iter().all(|c| c.matches(document)),
        Clause::Or(items) => items.iter().any(|c| c.matches(document)),
        Clause::Where(predicate) => predicate(document),
        Clause::Field { path, condition } => {
            let value = document.get_path(path).unwrap_or(&NULL);
            match condition {
                Condition::Equals(expected) => equals(value, expected),
                Condition::Operators(operators) => {
                    operators.iter().all(|op| operator_matches(op, value))
                }
            }
        }
    }
}

fn equals(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Array(items), scalar) if !scalar.is_array() && !scalar.is_object() => {
            contains_loose(items, scalar)
        }
        _ => loose_eq(value, expected),
    }
}

fn operator_matches(operator: &Operator, a: &Value) -> bool {
    if a.is_null() && !matches!(operator, Operator::Exists(_)) {
        return false;
    }

    match operator {
        Operator::Eq(b) => loose_eq(a, b),
        Operator::Ne(b) => !loose_eq(a, b),
        Operator::Gt(b) => compare_values(a, b) == Some(Ordering::Greater),
        Operator::Gte(b) => matches!(compare_values(a, b), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt(b) => compare_values(a, b) == Some(Ordering::Less),
        Operator::Lte(b) => matches!(compare_values(a, b), Some(Ordering::Less | Ordering::Equal)),
        Operator::In(b) => match (a, b) {
            (Value::Array(values), Value::Array(set)) => values.iter().any(|v| contains_loose(set, v)),
            (_, Value::Array(set)) => contains_loose(set, a),
            _ => false,
        },
        Operator::Nin(b) => match (a, b) {
            (Value::Array(values), Value::Array(set)) => !values.iter().any(|v| contains_loose(set, v)),
            (_, Value::Array(set)) => !contains_loose(set, a),
            _ => false,
        },
        Operator::Has(needle) => contains_loose(&as_list(a), needle),
        Operator::All(required) => {
            let values = as_list(a);
            required.iter().all(|r| contains_loose(&values, r))
        }
        Operator::Regex(re) => scalar_text(a).map(|s| re.is_match(&s)).unwrap_or(false),
        Operator::NotRegex(re) => scalar_text(a).map(|s| !re.is_match(&s)).unwrap_or(false),
        Operator::Size(n) => as_list(a).len() as i64 == *n,
        Operator::Mod { divisor, remainder } => match numeric_value(a) {
            Some(n) => (n.trunc() as i64).checked_rem(*divisor) == Some(*remainder),
            None => false,
        },
        Operator::Func(predicate) => predicate(a),
        Operator::Exists(expected) => !a.is_null() == *expected,
        Operator::Fuzzy {
            search,
            distance,
            min_score,
        } => match scalar_text(a) {
            Some(text) => fuzzy_score(search, &text, *distance) >= *min_score,
            None => false,
        },
    }
}

/// Array view of a field. A string holding a JSON array is decoded, anything
/// else is an empty list.
fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(_) | Value::Object(_) => None,
        other => to_plain_string(other),
    }
}
