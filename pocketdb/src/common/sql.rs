use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// Quotes a table, column or index name for SQLite.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for SQLite.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `json_extract(document, '$.path')` for a dot separated field path.
pub(crate) fn json_extract(path: &str) -> String {
    format!("json_extract(document, {})", quote_literal(&format!("$.{}", path)))
}

/// Converts a JSON scalar into the value SQLite compares it as. Booleans
/// become integers and nested values their JSON text.
pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
