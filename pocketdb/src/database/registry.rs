use crate::codec::DocumentCodec;
use crate::common::{resolve_path, to_sql_value, Document, CRITERIA_FUNCTION, DOCUMENT_KEY_FUNCTION};
use crate::database::DatabaseInner;
use crate::filter::Criteria;
use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use std::sync::{Arc, LazyLock, Weak};

/// Criteria registered for a native scan, keyed by an opaque id that the
/// SQL bridge function receives as its first argument.
static CRITERIA: LazyLock<DashMap<String, Arc<RegisteredCriteria>>> = LazyLock::new(DashMap::new);

/// Every open database, for `close_all`.
static LIVE: LazyLock<Mutex<Vec<Weak<DatabaseInner>>>> = LazyLock::new(|| Mutex::new(Vec::new()));

struct RegisteredCriteria {
    owner: Weak<DatabaseInner>,
    criteria: Criteria,
    codec: DocumentCodec,
}

/// Keeps a criteria callable from SQL while alive.
///
/// Dropping the registration releases the id. Ids that outlive their owning
/// database evaluate to no match.
pub struct CriteriaRegistration {
    id: String,
}

impl CriteriaRegistration {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for CriteriaRegistration {
    fn drop(&mut self) {
        CRITERIA.remove(&self.id);
    }
}

impl std::fmt::Debug for CriteriaRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriteriaRegistration").field("id", &self.id).finish()
    }
}

pub(crate) fn register_criteria(
    owner: &Weak<DatabaseInner>,
    criteria: Criteria,
    codec: DocumentCodec,
) -> CriteriaRegistration {
    let id = format!("criteria{}", uuid::Uuid::new_v4().simple());
    CRITERIA.insert(
        id.clone(),
        Arc::new(RegisteredCriteria {
            owner: owner.clone(),
            criteria,
            codec,
        }),
    );
    log::debug!("Registered criteria {}", id);
    CriteriaRegistration { id }
}

fn lookup(id: &str) -> Option<Arc<RegisteredCriteria>> {
    let entry = CRITERIA.get(id).map(|e| e.value().clone())?;
    if entry.owner.strong_count() == 0 {
        CRITERIA.remove(id);
        return None;
    }
    Some(entry)
}

/// Evaluates registered criteria against a stored row. Unknown ids, stale
/// ids and undecodable rows are no match.
pub(crate) fn evaluate_criteria(id: &str, stored: &str) -> bool {
    let Some(entry) = lookup(id) else {
        log::debug!("Criteria {} is not registered", id);
        return false;
    };
    match entry.codec.decode(stored) {
        Some(document) => entry.criteria.matches(&document),
        None => false,
    }
}

pub(crate) fn evaluate_document(id: &str, document: &Document) -> bool {
    lookup(id)
        .map(|entry| entry.criteria.matches(document))
        .unwrap_or(false)
}

/// Drops every registration owned by `owner`, plus any whose owner is gone.
pub(crate) fn purge_criteria(owner: *const DatabaseInner) {
    CRITERIA.retain(|_, entry| {
        entry.owner.strong_count() > 0 && !std::ptr::eq(entry.owner.as_ptr(), owner)
    });
}

/// Extracts a field from a stored row for ORDER BY. With a registration id
/// the row is decoded with that registration's codec.
fn document_key(key: &str, stored: &str, id: Option<&str>) -> SqlValue {
    let document = match id.and_then(lookup) {
        Some(entry) => entry.codec.decode(stored),
        None => DocumentCodec::plain().decode(stored),
    };
    document
        .as_ref()
        .and_then(|doc| resolve_path(doc.as_map(), key))
        .map(to_sql_value)
        .unwrap_or(SqlValue::Null)
}

fn text_arg<'a>(ctx: &'a Context<'_>, index: usize) -> Option<&'a str> {
    match ctx.get_raw(index) {
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok(),
        _ => None,
    }
}

/// Installs the bridge functions on a fresh connection.
pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(CRITERIA_FUNCTION, 2, FunctionFlags::SQLITE_UTF8, |ctx| {
        Ok(match (text_arg(ctx, 0), text_arg(ctx, 1)) {
            (Some(id), Some(stored)) => evaluate_criteria(id, stored),
            _ => false,
        })
    })?;

    conn.create_scalar_function(DOCUMENT_KEY_FUNCTION, 2, FunctionFlags::SQLITE_UTF8, |ctx| {
        Ok(match (text_arg(ctx, 0), text_arg(ctx, 1)) {
            (Some(key), Some(stored)) => document_key(key, stored, None),
            _ => SqlValue::Null,
        })
    })?;

    conn.create_scalar_function(DOCUMENT_KEY_FUNCTION, 3, FunctionFlags::SQLITE_UTF8, |ctx| {
        Ok(match (text_arg(ctx, 0), text_arg(ctx, 1)) {
            (Some(key), Some(stored)) => document_key(key, stored, text_arg(ctx, 2)),
            _ => SqlValue::Null,
        })
    })?;
    Ok(())
}

pub(crate) fn track(database: &Arc<DatabaseInner>) {
    let mut live = LIVE.lock();
    live.retain(|weak| weak.strong_count() > 0);
    live.push(Arc::downgrade(database));
}

/// Snapshot of every database that is still referenced somewhere.
pub(crate) fn live_databases() -> Vec<Arc<DatabaseInner>> {
    let mut live = LIVE.lock();
    live.retain(|weak| weak.strong_count() > 0);
    live.iter().filter_map(Weak::upgrade).collect()
}
