use crate::codec::sha256_hex;
use crate::collection::SearchableFields;
use crate::common::{
    json_extract, parse_numeric, quote_ident, quote_literal, to_plain_string, DOC_ID,
    SEARCHABLE_PREFIX,
};
use crate::filter::criteria::{Clause, Condition, Criteria, Operator};
use serde_json::Value;

/// How a query will be evaluated by the storage engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum QueryPlan {
    /// A native `WHERE` body. Empty when every row matches.
    Native(String),
    /// The criteria must be evaluated row by row through the registry bridge.
    Interpreted,
}

/// Rewrites the translatable subset of criteria into native SQL.
///
/// The subset is a flat conjunction of field conditions whose values are
/// scalars or operator objects limited to `$gt`, `$gte`, `$lt`, `$lte`, `$in`,
/// `$nin` and `$exists`. Searchable fields are compared through their side
/// column, hashing literal operands when the column holds hashes. For an
/// encrypted collection only the identifier and searchable fields are
/// readable by the engine, so any other field forces interpretation.
///
/// Strings that read as numbers and booleans compare loosely in the matcher
/// (`"02110" == 2110`, `true == "yes"`), which SQL cannot express, so such
/// operands are interpreted unless the field is hashed.
pub(crate) struct Translator<'a> {
    searchable: &'a SearchableFields,
    encrypted: bool,
}

impl<'a> Translator<'a> {
    pub(crate) fn new(searchable: &'a SearchableFields, encrypted: bool) -> Self {
        Translator {
            searchable,
            encrypted,
        }
    }

    pub(crate) fn plan(&self, criteria: &Criteria) -> QueryPlan {
        if self.can_translate(criteria) {
            QueryPlan::Native(self.to_native_where(criteria))
        } else {
            QueryPlan::Interpreted
        }
    }

    pub(crate) fn can_translate(&self, criteria: &Criteria) -> bool {
        criteria.clauses().iter().all(|clause| match clause {
            Clause::Field { path, condition } => {
                self.is_readable(path) && condition_is_translatable(condition, self.is_hashed(path))
            }
            _ => false,
        })
    }

    /// Builds the `WHERE` body for criteria accepted by [`Self::can_translate`].
    pub(crate) fn to_native_where(&self, criteria: &Criteria) -> String {
        let mut parts = Vec::new();
        for clause in criteria.clauses() {
            if let Clause::Field { path, condition } = clause {
                let expr = self.expression(path);
                let hashed = self.is_hashed(path);
                match condition {
                    Condition::Equals(value) => parts.push(equality(&expr, value, hashed)),
                    Condition::Operators(operators) => {
                        for operator in operators {
                            if let Some(part) = operator_condition(&expr, operator, hashed) {
                                parts.push(part);
                            }
                        }
                    }
                }
            }
        }
        parts.join(" AND ")
    }

    fn is_readable(&self, path: &str) -> bool {
        !self.encrypted || path == DOC_ID || self.searchable.contains_key(path)
    }

    fn is_hashed(&self, path: &str) -> bool {
        self.searchable.get(path).map(|f| f.hashed).unwrap_or(false)
    }

    fn expression(&self, path: &str) -> String {
        if self.searchable.contains_key(path) {
            quote_ident(&format!("{}{}", SEARCHABLE_PREFIX, path))
        } else {
            json_extract(path)
        }
    }
}

/// Operands SQL compares the same way the matcher does.
fn is_exact_operand(value: &Value, hashed: bool) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => hashed || parse_numeric(s).is_none(),
        _ => false,
    }
}

fn condition_is_translatable(condition: &Condition, hashed: bool) -> bool {
    match condition {
        Condition::Equals(Value::Null) => true,
        Condition::Equals(Value::Bool(_)) => hashed,
        Condition::Equals(value) => is_exact_operand(value, hashed),
        Condition::Operators(operators) => operators.iter().all(|op| match op {
            Operator::Gt(v) | Operator::Gte(v) | Operator::Lt(v) | Operator::Lte(v) => {
                is_exact_operand(v, hashed)
            }
            Operator::In(Value::Array(items)) | Operator::Nin(Value::Array(items)) => {
                items.iter().all(|item| is_exact_operand(item, hashed))
            }
            Operator::Exists(_) => true,
            _ => false,
        }),
    }
}

fn operator_condition(expr: &str, operator: &Operator, hashed: bool) -> Option<String> {
    match operator {
        Operator::Gt(v) => Some(format!("{} > {}", expr, literal(v, hashed))),
        Operator::Gte(v) => Some(format!("{} >= {}", expr, literal(v, hashed))),
        Operator::Lt(v) => Some(format!("{} < {}", expr, literal(v, hashed))),
        Operator::Lte(v) => Some(format!("{} <= {}", expr, literal(v, hashed))),
        Operator::In(Value::Array(items)) => Some(in_condition(expr, items, hashed, false)),
        Operator::Nin(Value::Array(items)) if items.is_empty() => None,
        Operator::Nin(Value::Array(items)) => Some(in_condition(expr, items, hashed, true)),
        Operator::Exists(true) => Some(format!("{} IS NOT NULL", expr)),
        Operator::Exists(false) => Some(format!("{} IS NULL", expr)),
        _ => None,
    }
}

fn in_condition(expr: &str, items: &[Value], hashed: bool, negate: bool) -> String {
    if items.is_empty() {
        return "0".to_string();
    }
    let values: Vec<String> = items.iter().map(|v| literal(v, hashed)).collect();
    let keyword = if negate { "NOT IN" } else { "IN" };
    format!("{} {} ({})", expr, keyword, values.join(","))
}

fn equality(expr: &str, value: &Value, hashed: bool) -> String {
    match value {
        Value::Null => format!("{} IS NULL", expr),
        other => format!("{} = {}", expr, literal(other, hashed)),
    }
}

/// Renders a scalar operand. Hashed columns compare against the hex SHA-256
/// of the operand text. Numbers stay unquoted, strings are always quoted.
fn literal(value: &Value, hashed: bool) -> String {
    let text = to_plain_string(value).unwrap_or_default();
    if hashed {
        return quote_literal(&sha256_hex(&text));
    }
    match value {
        Value::Number(n) => n.to_string(),
        _ => quote_literal(&text),
    }
}
