use crate::codec::sha256_hex;
use crate::common::{
    collect_path_values, quote_ident, resolve_path, to_plain_string, Document, SEARCHABLE_PREFIX,
};
use crate::errors::PocketResult;
use indexmap::IndexMap;
use itertools::Itertools;
use rusqlite::Connection;
use serde_json::Value;

/// Configuration of one searchable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchableField {
    /// Whether the side column stores the hex SHA-256 of the value instead
    /// of the value itself.
    pub hashed: bool,
}

/// Searchable fields of a collection keyed by field path, in declaration
/// order.
pub type SearchableFields = IndexMap<String, SearchableField>;

/// Name of the side column mirroring `field`.
pub(crate) fn searchable_column(field: &str) -> String {
    format!("{}{}", SEARCHABLE_PREFIX, field)
}

/// Computes the side column values of a document, one entry per configured
/// field in declaration order. Arrays are joined with commas and a missing
/// field yields `None`.
pub(crate) fn compute_index_values(
    fields: &SearchableFields,
    document: &Document,
) -> Vec<(String, Option<String>)> {
    fields
        .iter()
        .map(|(field, config)| {
            let value = extract_text(document, field);
            let value = match value {
                Some(text) if config.hashed => Some(sha256_hex(&text)),
                other => other,
            };
            (searchable_column(field), value)
        })
        .collect()
}

fn extract_text(document: &Document, field: &str) -> Option<String> {
    if let Some(value) = resolve_path(document.as_map(), field) {
        return match value {
            Value::Array(items) => Some(join_values(items.iter())),
            other => to_plain_string(other),
        };
    }

    let root = Value::Object(document.as_map().clone());
    let values: Vec<&Value> = collect_path_values(&root, field)
        .into_iter()
        .filter(|v| !v.is_null())
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(join_values(values.into_iter()))
    }
}

fn join_values<'a>(values: impl Iterator<Item = &'a Value>) -> String {
    values
        .map(|v| to_plain_string(v).unwrap_or_default())
        .join(",")
}

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone)]
pub(crate) struct ColumnInfo {
    pub(crate) name: String,
    pub(crate) declared_type: String,
    pub(crate) not_null: bool,
    pub(crate) primary_key: bool,
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> PocketResult<Vec<ColumnInfo>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok(ColumnInfo {
            name: row.get(1)?,
            declared_type: row.get(2)?,
            not_null: row.get::<_, i64>(3)? != 0,
            primary_key: row.get::<_, i64>(5)? != 0,
        })
    })?;

    let mut columns = Vec::new();
    for column in rows {
        columns.push(column?);
    }
    Ok(columns)
}

/// Adds the missing side columns of `fields` to `table`.
pub(crate) fn ensure_searchable_columns(
    conn: &Connection,
    table: &str,
    fields: &SearchableFields,
) -> PocketResult<()> {
    if fields.is_empty() {
        return Ok(());
    }

    let existing: Vec<String> = table_columns(conn, table)?
        .into_iter()
        .map(|c| c.name)
        .collect();
    for field in fields.keys() {
        let column = searchable_column(field);
        if !existing.contains(&column) {
            log::debug!("Adding searchable column {} to {}", column, table);
            conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} TEXT NULL",
                quote_ident(table),
                quote_ident(&column)
            ))?;
        }
    }
    Ok(())
}

/// Physically removes a column by rebuilding the table without it.
///
/// The rebuild copies every remaining column into a temporary table, drops
/// the original and renames the copy, all inside one transaction. Indexes of
/// the table are recreated, except those over the dropped column. Returns
/// `false` when the column does not exist.
pub(crate) fn drop_table_column(
    conn: &mut Connection,
    table: &str,
    column: &str,
) -> PocketResult<bool> {
    let columns = table_columns(conn, table)?;
    if !columns.iter().any(|c| c.name == column) {
        return Ok(false);
    }

    let kept: Vec<&ColumnInfo> = columns.iter().filter(|c| c.name != column).collect();
    let definitions = kept.iter().map(|c| column_definition(c)).join(", ");
    let names = kept.iter().map(|c| quote_ident(&c.name)).join(", ");
    let tmp = format!("{}_tmp_{}", table, uuid::Uuid::new_v4().simple());

    let tx = conn.transaction()?;
    let indexes = table_indexes(&tx, table)?;
    tx.execute_batch(&format!(
        "CREATE TABLE {tmp} ({definitions});\
         INSERT INTO {tmp} ({names}) SELECT {names} FROM {table};\
         DROP TABLE {table};\
         ALTER TABLE {tmp} RENAME TO {table};",
        tmp = quote_ident(&tmp),
        definitions = definitions,
        names = names,
        table = quote_ident(table),
    ))?;
    for (name, sql) in indexes {
        if sql.contains(column) {
            log::debug!("Dropping index {} over removed column {}", name, column);
            continue;
        }
        tx.execute_batch(&sql)?;
    }
    tx.commit()?;
    Ok(true)
}

/// Name and `CREATE INDEX` statement of every explicit index on `table`.
fn table_indexes(conn: &Connection, table: &str) -> PocketResult<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT name, sql FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL",
    )?;
    let rows = stmt.query_map([table], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    let mut indexes = Vec::new();
    for index in rows {
        indexes.push(index?);
    }
    Ok(indexes)
}

fn column_definition(column: &ColumnInfo) -> String {
    let mut definition = format!("{} {}", quote_ident(&column.name), column.declared_type);
    if column.primary_key {
        definition.push_str(" PRIMARY KEY AUTOINCREMENT");
    } else if column.not_null {
        definition.push_str(" NOT NULL");
    }
    definition
}
