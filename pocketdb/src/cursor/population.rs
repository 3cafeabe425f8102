use crate::collection::Collection;
use crate::common::{collect_path_values, last_segment, to_plain_string, visit_path_parents_mut, Document, DOC_ID};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use crate::filter::field;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[cfg(test)]
thread_local! {
    static LOOKUPS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Foreign lookups issued by population on this thread.
#[cfg(test)]
pub(crate) fn lookup_count() -> usize {
    LOOKUPS.with(|count| count.get())
}

/// A reference resolution rule.
///
/// The values found at `local_field` are looked up in the `foreign`
/// collection by `foreign_field` and the matching documents are stored next
/// to the reference under the alias. `foreign` may name a collection of the
/// same database or `database.collection` of the owning client.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::cursor::Populate;
///
/// let orders = orders
///     .find(all())?
///     .populate_with(Populate::new("items.product_id", "products").alias("product"))
///     .to_array()?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Populate {
    local_field: String,
    foreign: String,
    foreign_field: String,
    alias: Option<String>,
}

impl Populate {
    pub fn new(local_field: &str, foreign: &str) -> Self {
        Populate {
            local_field: local_field.to_string(),
            foreign: foreign.to_string(),
            foreign_field: DOC_ID.to_string(),
            alias: None,
        }
    }

    /// The field of the foreign documents matched against, `_id` by default.
    pub fn foreign_field(mut self, foreign_field: &str) -> Self {
        self.foreign_field = foreign_field.to_string();
        self
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    pub fn local_field(&self) -> &str {
        &self.local_field
    }

    pub fn foreign(&self) -> &str {
        &self.foreign
    }

    /// The key the resolved value is stored under. Defaults to the reference
    /// name without its `_id` suffix, `user_id` becoming `user`, or else the
    /// foreign collection name.
    pub fn target_alias(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match last_segment(&self.local_field).strip_suffix("_id") {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => last_segment(&self.foreign).to_string(),
        }
    }
}

/// Resolves `rule` for every document with a single lookup against the
/// foreign collection.
pub(crate) fn populate_documents(
    source: &Collection,
    documents: &mut [Document],
    rule: &Populate,
) -> PocketResult<()> {
    if documents.is_empty() {
        return Ok(());
    }

    let keys = collect_keys(documents, &rule.local_field);
    let mut found: HashMap<String, Document> = HashMap::new();
    if !keys.is_empty() {
        let target = resolve_target(source, &rule.foreign)?;
        log::debug!(
            "Populating {} from {} with {} keys",
            rule.local_field,
            rule.foreign,
            keys.len()
        );
        #[cfg(test)]
        LOOKUPS.with(|count| count.set(count.get() + 1));
        let matches = target
            .find(field(&rule.foreign_field).in_array(keys.into_values().collect::<Vec<Value>>()))?
            .to_array()?;
        for document in matches {
            if let Some(key) = document.get_path(&rule.foreign_field).and_then(to_plain_string) {
                found.entry(key).or_insert(document);
            }
        }
    }

    let alias = rule.target_alias();
    for document in documents.iter_mut() {
        let mut root = std::mem::take(document).into_value();
        visit_path_parents_mut(&mut root, &rule.local_field, &mut |parent: &mut Map<String, Value>, last: &str| {
            let resolved = resolve_reference(parent, last, &found);
            parent.insert(alias.clone(), resolved);
        });
        *document = Document::from_object(root);
    }
    Ok(())
}

/// Distinct scalar reference values, keyed by their text form.
fn collect_keys(documents: &[Document], local_field: &str) -> IndexMap<String, Value> {
    let mut keys = IndexMap::new();
    for document in documents {
        let root = Value::Object(document.as_map().clone());
        for value in collect_path_values(&root, local_field) {
            let candidates: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                other => vec![other],
            };
            for candidate in candidates {
                if candidate.is_null() || candidate.is_array() || candidate.is_object() {
                    continue;
                }
                if let Some(key) = to_plain_string(candidate) {
                    keys.entry(key).or_insert_with(|| candidate.clone());
                }
            }
        }
    }
    keys
}

fn resolve_reference(parent: &Map<String, Value>, last: &str, found: &HashMap<String, Document>) -> Value {
    let lookup = |value: &Value| {
        to_plain_string(value)
            .and_then(|key| found.get(&key))
            .map(|doc| doc.to_value())
    };
    match parent.get(last) {
        Some(Value::Array(items)) => Value::Array(items.iter().filter_map(lookup).collect()),
        Some(value) => lookup(value).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn resolve_target(source: &Collection, foreign: &str) -> PocketResult<Collection> {
    let db = source.database()?;
    match foreign.split_once('.') {
        None => db.collection(foreign),
        Some((database, collection)) => match db.client() {
            Some(client) => client.select_db(database)?.collection(collection),
            None => {
                log::error!("Cannot resolve {} without a client", foreign);
                Err(PocketError::new(
                    &format!(
                        "Cannot populate from {}: the database was not opened through a client",
                        foreign
                    ),
                    ErrorKind::InvalidOperation,
                ))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::doc;
    use serde_json::json;

    #[test]
    fn test_target_alias() {
        assert_eq!(Populate::new("user_id", "users").target_alias(), "user");
        assert_eq!(Populate::new("items.product_id", "products").target_alias(), "product");
        assert_eq!(Populate::new("author", "users").target_alias(), "users");
        assert_eq!(Populate::new("_id", "shop.users").target_alias(), "users");
        assert_eq!(Populate::new("user_id", "users").alias("owner").target_alias(), "owner");
    }

    #[test]
    fn test_collect_keys_dedupes_and_flattens() {
        let docs = vec![
            doc! { "user_id": 1 },
            doc! { "user_id": "1" },
            doc! { "user_id": [2, 3, null] },
            doc! { "user_id": null },
            doc! { "other": 4 },
        ];
        let keys = collect_keys(&docs, "user_id");
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_populate_scalar_array_and_missing() {
        let db = Database::open_in_memory().unwrap();
        let users = db.collection("users").unwrap();
        users.insert(doc! { "_id": "u1", "name": "Alice" }).unwrap();
        users.insert(doc! { "_id": "u2", "name": "Bob" }).unwrap();
        let orders = db.collection("orders").unwrap();

        let mut docs = vec![
            doc! { "user_id": "u1" },
            doc! { "user_id": ["u1", "u2", "zz"] },
            doc! { "user_id": "zz" },
        ];
        populate_documents(&orders, &mut docs, &Populate::new("user_id", "users")).unwrap();

        assert_eq!(docs[0].get_path("user.name"), Some(&json!("Alice")));
        assert_eq!(docs[1].get("user").and_then(Value::as_array).map(Vec::len), Some(2));
        assert_eq!(docs[2].get("user"), Some(&Value::Null));
    }

    #[test]
    fn test_qualified_target_needs_client() {
        let db = Database::open_in_memory().unwrap();
        let orders = db.collection("orders").unwrap();
        let mut docs = vec![doc! { "user_id": "u1" }];
        let err = populate_documents(&orders, &mut docs, &Populate::new("user_id", "shop.users"))
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidOperation);
    }
}
