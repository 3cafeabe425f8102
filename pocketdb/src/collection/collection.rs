use crate::codec::DocumentCodec;
use crate::collection::hooks::HookRegistry;
use crate::collection::id_generator::{parse_prefixed, IdGenerator};
use crate::collection::searchable::{
    compute_index_values, drop_table_column, ensure_searchable_columns, searchable_column,
};
use crate::collection::{
    BatchResult, Hook, HookEvent, HookId, IdMode, SearchableField, SearchableFields, WriteResult,
};
use crate::common::{json_extract, quote_ident, quote_literal, to_sql_value, Document, CRITERIA_FUNCTION, DOC_ID};
use crate::cursor::{populate_documents, Cursor, Populate};
use crate::database::{validate_identifier, CriteriaRegistration, Database, DatabaseInner};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use crate::filter::{Criteria, IntoCriteria, QueryPlan, Translator};
use itertools::Itertools;
use parking_lot::RwLock;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::sync::{Arc, Weak};

/// A named set of documents stored in one table.
///
/// A collection handle is cheap to clone and every clone shares the same
/// identifier mode, encryption key, searchable fields and hooks. The handle
/// does not keep its database open; once the database is closed or dropped
/// every operation fails with `DatabaseClosed`.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::doc;
/// use pocketdb::filter::field;
///
/// let users = db.collection("users")?;
/// users.set_id_mode_prefix("USR")?;
/// users.insert(doc!{ "name": "Alice", "age": 25 })?;
///
/// for user in users.find(field("age").gt(20))? {
///     println!("{}", user?);
/// }
/// ```
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    name: RwLock<String>,
    database: Weak<DatabaseInner>,
    id_generator: IdGenerator,
    encryption_key: RwLock<Option<String>>,
    searchable: RwLock<SearchableFields>,
    hooks: HookRegistry,
}

/// A `WHERE` body together with the registration it refers to, if the
/// criteria are evaluated through the SQL bridge.
pub(crate) struct QueryFilter {
    pub(crate) sql: String,
    pub(crate) registration: Option<CriteriaRegistration>,
}

impl QueryFilter {
    pub(crate) fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

impl Collection {
    pub(crate) fn new(name: &str, database: Weak<DatabaseInner>) -> Collection {
        Collection {
            inner: Arc::new(CollectionInner {
                name: RwLock::new(name.to_string()),
                database,
                id_generator: IdGenerator::new(),
                encryption_key: RwLock::new(None),
                searchable: RwLock::new(SearchableFields::new()),
                hooks: HookRegistry::new(),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    fn table(&self) -> String {
        quote_ident(&self.name())
    }

    /// The database owning this collection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` when the database no longer exists.
    pub fn database(&self) -> PocketResult<Database> {
        match self.inner.database.upgrade() {
            Some(inner) => Ok(Database::from_inner(inner)),
            None => {
                log::error!("Database of collection {} is gone", self.name());
                Err(PocketError::new(
                    &format!("Database of collection {} is closed", self.name()),
                    ErrorKind::DatabaseClosed,
                ))
            }
        }
    }

    /// Forgets hooks and searchable configuration after the table is dropped.
    pub(crate) fn reset(&self) {
        self.inner.hooks.clear();
        self.inner.searchable.write().clear();
    }

    pub fn id_mode(&self) -> IdMode {
        self.inner.id_generator.mode()
    }

    /// Generates UUID identifiers for documents inserted without `_id`.
    pub fn set_id_mode_auto(&self) {
        self.inner.id_generator.set_mode(IdMode::Auto, 0);
    }

    /// Requires every inserted document to carry its own `_id`.
    pub fn set_id_mode_manual(&self) {
        self.inner.id_generator.set_mode(IdMode::Manual, 0);
    }

    /// Generates `PREFIX-000001` style identifiers. The counter continues
    /// after the highest identifier already stored under the prefix.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for an empty prefix and `DatabaseClosed` once the
    /// database is closed.
    pub fn set_id_mode_prefix(&self, prefix: &str) -> PocketResult<()> {
        if prefix.is_empty() {
            log::error!("Identifier prefix of {} is empty", self.name());
            return Err(PocketError::new(
                "Identifier prefix cannot be empty",
                ErrorKind::InvalidId,
            ));
        }

        let db = self.database()?;
        let seed = match self.highest_prefixed(&db, prefix) {
            Ok(seed) => seed,
            Err(e) => {
                log::warn!("Could not scan existing {} identifiers: {}", prefix, e);
                0
            }
        };
        log::debug!("Prefix {} of {} starts after {}", prefix, self.name(), seed);
        self.inner
            .id_generator
            .set_mode(IdMode::Prefix(prefix.to_string()), seed);
        Ok(())
    }

    fn highest_prefixed(&self, db: &Database, prefix: &str) -> PocketResult<u64> {
        let marker = format!("{}-", prefix);
        let sql = format!(
            "SELECT {id} FROM {table} WHERE substr({id}, 1, ?1) = ?2",
            id = json_extract(DOC_ID),
            table = self.table()
        );
        db.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params![marker.chars().count() as i64, marker], |row| {
                row.get::<_, Option<String>>(0)
            })?;
            let mut highest = 0;
            for id in rows {
                if let Some(n) = id?.and_then(|id| parse_prefixed(prefix, &id)) {
                    highest = highest.max(n);
                }
            }
            Ok(highest)
        })
    }

    /// The key of this collection, overriding the database default.
    pub fn encryption_key(&self) -> Option<String> {
        self.inner.encryption_key.read().clone()
    }

    /// Sets the key of this collection. `None` falls back to the database
    /// default.
    pub fn set_encryption_key(&self, key: Option<&str>) {
        *self.inner.encryption_key.write() = key.filter(|k| !k.is_empty()).map(str::to_string);
    }

    pub(crate) fn codec_for(&self, db: &Database) -> DocumentCodec {
        match self.encryption_key() {
            Some(key) => DocumentCodec::new(Some(&key)),
            None => db.codec(),
        }
    }

    /// Whether documents are stored encrypted.
    pub fn is_encrypted(&self) -> PocketResult<bool> {
        let db = self.database()?;
        Ok(self.codec_for(&db).is_encrypted())
    }

    /// Declares the searchable fields, replacing the previous declaration.
    ///
    /// Each field gets a `si_<field>` side column holding its value, or the
    /// hex SHA-256 of its value when `hashed` is set. Rows already stored
    /// are re-indexed.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// users.set_searchable_fields(&["email"], true)?;
    /// let alice = users.find_one(field("email").eq("alice@example.com"))?;
    /// ```
    pub fn set_searchable_fields(&self, fields: &[&str], hashed: bool) -> PocketResult<()> {
        let config: SearchableFields = fields
            .iter()
            .map(|f| (f.to_string(), SearchableField { hashed }))
            .collect();
        let db = self.database()?;
        let name = self.name();
        db.with_connection(|conn| ensure_searchable_columns(conn, &name, &config))
            .map_err(|e| {
                log::error!("Failed to add searchable columns to {}: {}", name, e);
                e
            })?;
        *self.inner.searchable.write() = config;
        self.reindex(&db)
    }

    pub fn searchable_fields(&self) -> SearchableFields {
        self.inner.searchable.read().clone()
    }

    /// Stops maintaining `field`. With `drop_column` the side column is
    /// removed by rebuilding the table. Returns false if the field was not
    /// searchable.
    pub fn remove_searchable_field(&self, field: &str, drop_column: bool) -> PocketResult<bool> {
        let removed = self.inner.searchable.write().shift_remove(field).is_some();
        if removed && drop_column {
            let db = self.database()?;
            let name = self.name();
            let column = searchable_column(field);
            db.with_connection(|conn| drop_table_column(conn, &name, &column))
                .map_err(|e| {
                    log::error!("Failed to drop column {} of {}: {}", column, name, e);
                    e
                })?;
        }
        Ok(removed)
    }

    fn reindex(&self, db: &Database) -> PocketResult<()> {
        let searchable = self.searchable_fields();
        if searchable.is_empty() {
            return Ok(());
        }
        let codec = self.codec_for(db);
        let rows = self.select_rows(db, "")?;
        let updates: Vec<(i64, Vec<(String, Option<String>)>)> = rows
            .into_iter()
            .filter_map(|(rowid, stored)| {
                codec
                    .decode(&stored)
                    .map(|doc| (rowid, compute_index_values(&searchable, &doc)))
            })
            .collect();
        if updates.is_empty() {
            return Ok(());
        }

        let assignments = searchable
            .keys()
            .enumerate()
            .map(|(i, field)| format!("{} = ?{}", quote_ident(&searchable_column(field)), i + 1))
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.table(),
            assignments,
            searchable.len() + 1
        );
        db.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (rowid, values) in &updates {
                    let mut params: Vec<SqlValue> = values.iter().map(|(_, v)| text_value(v)).collect();
                    params.push(SqlValue::Integer(*rowid));
                    stmt.execute(params_from_iter(params))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Registers a hook. Hooks of one event run in registration order.
    pub fn on(&self, hook: Hook) -> HookId {
        self.inner.hooks.register(hook)
    }

    /// Removes the hook `id`, or every hook of `event` when `id` is `None`.
    /// Returns the number of hooks removed.
    pub fn off(&self, event: HookEvent, id: Option<HookId>) -> usize {
        self.inner.hooks.unregister(event, id)
    }

    /// Inserts a document.
    ///
    /// Before-insert hooks may replace or veto the document. A document
    /// without `_id` receives one according to the identifier mode.
    ///
    /// # Errors
    ///
    /// * `InvalidId` when the document has no `_id` in manual mode
    /// * `EncodingError` or `SecurityError` when the document cannot be encoded
    /// * `BackendError` when SQLite rejects the insert
    /// * any error returned by a before-insert hook
    pub fn insert(&self, document: Document) -> PocketResult<WriteResult> {
        let db = self.database()?;
        let Some(document) = self.inner.hooks.before_insert(document)? else {
            log::debug!("Insert into {} vetoed", self.name());
            return Ok(WriteResult::Vetoed);
        };
        let (id, document) = self.write_new(&db, document)?;
        self.inner.hooks.after_insert(&id, &document);
        Ok(WriteResult::Written(id))
    }

    /// Inserts documents in one transaction. A veto or an error rolls back
    /// the whole batch. After-insert hooks run once the batch committed.
    pub fn insert_many(&self, documents: Vec<Document>) -> PocketResult<BatchResult> {
        let db = self.database()?;
        db.with_connection(|conn| Ok(conn.execute_batch("BEGIN")?))?;

        let mut written = Vec::with_capacity(documents.len());
        for (index, document) in documents.into_iter().enumerate() {
            let outcome = match self.inner.hooks.before_insert(document) {
                Ok(Some(document)) => self.write_new(&db, document).map(Some),
                Ok(None) => Ok(None),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(Some(pair)) => written.push(pair),
                Ok(None) => {
                    log::debug!("Batch insert into {} vetoed at {}", self.name(), index);
                    rollback(&db);
                    return Ok(BatchResult::Vetoed(index));
                }
                Err(e) => {
                    log::error!("Batch insert into {} failed at {}: {}", self.name(), index, e);
                    rollback(&db);
                    return Err(e);
                }
            }
        }

        if let Err(e) = db.with_connection(|conn| Ok(conn.execute_batch("COMMIT")?)) {
            log::error!("Failed to commit batch insert into {}: {}", self.name(), e);
            rollback(&db);
            return Err(e);
        }

        for (id, document) in &written {
            self.inner.hooks.after_insert(id, document);
        }
        Ok(BatchResult::Written(written.into_iter().map(|(id, _)| id).collect()))
    }

    fn write_new(&self, db: &Database, mut document: Document) -> PocketResult<(Value, Document)> {
        if !document.has_id() {
            match self.inner.id_generator.next_id() {
                Some(id) => document.set_id(id),
                None => {
                    log::error!("Document inserted into {} has no identifier", self.name());
                    return Err(PocketError::new(
                        &format!("Collection {} requires an _id in manual mode", self.name()),
                        ErrorKind::InvalidId,
                    ));
                }
            }
        }
        let id = document.id().cloned().unwrap_or(Value::Null);

        let encoded = self.codec_for(db).encode(&document)?;
        let index = compute_index_values(&self.inner.searchable.read(), &document);

        let columns = std::iter::once(quote_ident("document"))
            .chain(index.iter().map(|(column, _)| quote_ident(column)))
            .join(", ");
        let placeholders = (1..=index.len() + 1).map(|i| format!("?{}", i)).join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns,
            placeholders
        );

        let mut params = vec![SqlValue::Text(encoded)];
        params.extend(index.iter().map(|(_, v)| text_value(v)));
        db.with_connection(|conn| {
            conn.execute(&sql, params_from_iter(params)).map_err(|e| {
                log::error!("Insert into {} failed: {}", self.name(), e);
                PocketError::from(e)
            })
        })?;
        Ok((id, document))
    }

    /// Inserts the document, or replaces the stored document with the same
    /// `_id` in one statement. Documents without `_id` are inserted. Hooks do
    /// not run for replacements.
    pub fn save(&self, document: Document) -> PocketResult<WriteResult> {
        let Some(id) = document.id().cloned() else {
            return self.insert(document);
        };
        let db = self.database()?;
        let encoded = self.codec_for(&db).encode(&document)?;
        let index = compute_index_values(&self.inner.searchable.read(), &document);

        let table = self.table();
        let mut columns = vec!["id".to_string(), quote_ident("document")];
        columns.extend(index.iter().map(|(column, _)| quote_ident(column)));
        let mut values = vec![
            format!(
                "(SELECT id FROM {} WHERE {} = ?1 LIMIT 1)",
                table,
                json_extract(DOC_ID)
            ),
            "?2".to_string(),
        ];
        values.extend((0..index.len()).map(|i| format!("?{}", i + 3)));
        let updates = columns[1..]
            .iter()
            .map(|column| format!("{c} = excluded.{c}", c = column))
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) DO UPDATE SET {}",
            table,
            columns.join(", "),
            values.join(", "),
            updates
        );

        let mut params = vec![to_sql_value(&id), SqlValue::Text(encoded)];
        params.extend(index.iter().map(|(_, v)| text_value(v)));
        db.with_connection(|conn| {
            conn.execute(&sql, params_from_iter(params)).map_err(|e| {
                log::error!("Save into {} failed: {}", self.name(), e);
                PocketError::from(e)
            })
        })?;
        Ok(WriteResult::Written(id))
    }

    /// Merges `data` into every matching document. See [`Self::update_with`].
    pub fn update(&self, criteria: impl IntoCriteria, data: Document) -> PocketResult<usize> {
        self.update_with(criteria, data, true)
    }

    /// Updates every matching document and returns how many were written.
    ///
    /// With `merge` the top level keys of `data` are laid over the stored
    /// document, otherwise `data` replaces it. The stored `_id` is kept in
    /// both cases. Before-update hooks may rewrite the criteria and the data.
    pub fn update_with(
        &self,
        criteria: impl IntoCriteria,
        data: Document,
        merge: bool,
    ) -> PocketResult<usize> {
        let mut criteria = criteria.into_criteria()?;
        let mut data = data;
        self.inner.hooks.before_update(&mut criteria, &mut data)?;

        let db = self.database()?;
        let codec = self.codec_for(&db);
        let searchable = self.searchable_fields();
        let filter = self.query_filter(&db, &codec, criteria);
        let rows = self.select_rows(&db, &filter.where_clause())?;
        drop(filter);

        let mut changes = Vec::with_capacity(rows.len());
        for (rowid, stored) in rows {
            let Some(original) = codec.decode(&stored) else {
                log::warn!("Skipping undecodable row {} of {}", rowid, self.name());
                continue;
            };
            let mut updated = if merge {
                let mut updated = original.clone();
                updated.merge(&data);
                updated
            } else {
                data.clone()
            };
            if let Some(id) = original.id() {
                updated.set_id(id.clone());
            }
            let encoded = codec.encode(&updated)?;
            let index = compute_index_values(&searchable, &updated);
            changes.push((rowid, encoded, index, original, updated));
        }
        if changes.is_empty() {
            return Ok(0);
        }

        let assignments = std::iter::once(format!("{} = ?1", quote_ident("document")))
            .chain(
                searchable
                    .keys()
                    .enumerate()
                    .map(|(i, f)| format!("{} = ?{}", quote_ident(&searchable_column(f)), i + 2)),
            )
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.table(),
            assignments,
            searchable.len() + 2
        );
        db.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (rowid, encoded, index, _, _) in &changes {
                    let mut params = vec![SqlValue::Text(encoded.clone())];
                    params.extend(index.iter().map(|(_, v)| text_value(v)));
                    params.push(SqlValue::Integer(*rowid));
                    stmt.execute(params_from_iter(params))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(|e| {
            log::error!("Update of {} failed: {}", self.name(), e);
            e
        })?;

        for (_, _, _, original, updated) in &changes {
            self.inner.hooks.after_update(original, updated);
        }
        Ok(changes.len())
    }

    /// Removes every matching document that no before-remove hook vetoes and
    /// returns how many were removed.
    pub fn remove(&self, criteria: impl IntoCriteria) -> PocketResult<usize> {
        let criteria = criteria.into_criteria()?;
        let db = self.database()?;
        let codec = self.codec_for(&db);
        let filter = self.query_filter(&db, &codec, criteria);
        let rows = self.select_rows(&db, &filter.where_clause())?;
        drop(filter);

        let mut removed = Vec::with_capacity(rows.len());
        for (rowid, stored) in rows {
            let document = match codec.decode(&stored) {
                Some(document) => document,
                None => {
                    log::warn!(
                        "Row {} of {} does not decode, remove hooks only see its identifier",
                        rowid,
                        self.name()
                    );
                    stored_identity(&stored)
                }
            };
            if self.inner.hooks.allows_remove(&document) {
                removed.push((rowid, document));
            } else {
                log::debug!("Removal of row {} from {} vetoed", rowid, self.name());
            }
        }
        if removed.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE id = ?1", self.table());
        db.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for (rowid, _) in &removed {
                    stmt.execute([rowid])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(|e| {
            log::error!("Remove from {} failed: {}", self.name(), e);
            e
        })?;

        for (_, document) in &removed {
            self.inner.hooks.after_remove(document);
        }
        Ok(removed.len())
    }

    /// Returns a lazy cursor over the matching documents.
    pub fn find(&self, criteria: impl IntoCriteria) -> PocketResult<Cursor> {
        Ok(Cursor::new(self.clone(), criteria.into_criteria()?))
    }

    pub fn find_one(&self, criteria: impl IntoCriteria) -> PocketResult<Option<Document>> {
        let documents = self.find(criteria)?.limit(1).to_array()?;
        Ok(documents.into_iter().next())
    }

    pub fn count(&self, criteria: impl IntoCriteria) -> PocketResult<usize> {
        Ok(self.find(criteria)?.count())
    }

    /// Resolves references in already loaded documents with one lookup
    /// against `foreign`, which may be `collection` or `database.collection`.
    /// The resolved documents are stored under `alias`, by default the
    /// foreign collection name.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let orders = orders.find(all())?.to_array()?;
    /// let orders = orders_collection.populate(orders, "user_id", "users", "_id", Some("user"))?;
    /// ```
    pub fn populate(
        &self,
        documents: Vec<Document>,
        local_field: &str,
        foreign: &str,
        foreign_field: &str,
        alias: Option<&str>,
    ) -> PocketResult<Vec<Document>> {
        let target = foreign.rsplit('.').next().unwrap_or(foreign);
        let rule = Populate::new(local_field, foreign)
            .foreign_field(foreign_field)
            .alias(alias.unwrap_or(target));
        let mut documents = documents;
        populate_documents(self, &mut documents, &rule)?;
        Ok(documents)
    }

    /// Renames the table. Returns false when a collection named `new_name`
    /// already exists.
    pub fn rename(&self, new_name: &str) -> PocketResult<bool> {
        validate_identifier(new_name, "collection")?;
        let db = self.database()?;
        if db.has_collection(new_name)? {
            log::warn!("Cannot rename {} to existing collection {}", self.name(), new_name);
            return Ok(false);
        }
        let old_name = self.name();
        db.with_connection(|conn| {
            conn.execute_batch(&format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&old_name),
                quote_ident(new_name)
            ))
            .map_err(|e| {
                log::error!("Failed to rename {} to {}: {}", old_name, new_name, e);
                PocketError::from(e)
            })
        })?;
        *self.inner.name.write() = new_name.to_string();
        db.rename_cached(&old_name, new_name);
        Ok(true)
    }

    /// Creates an index over `field` and returns its name. Searchable fields
    /// are indexed through their side column.
    pub fn create_index(&self, field: &str, name: Option<&str>) -> PocketResult<String> {
        let db = self.database()?;
        let collection = self.name();
        if !self.inner.searchable.read().contains_key(field) {
            return db.create_json_index(&collection, field, name);
        }

        let column = searchable_column(field);
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("idx_{}_{}", collection, column.replace('.', "_")),
        };
        db.with_connection(|conn| {
            conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&name),
                quote_ident(&collection),
                quote_ident(&column)
            ))
            .map_err(|e| {
                log::error!("Failed to create index {}: {}", name, e);
                PocketError::from(e)
            })
        })?;
        Ok(name)
    }

    /// Drops the table and forgets hooks and searchable fields.
    pub fn drop(&self) -> PocketResult<()> {
        let db = self.database()?;
        db.drop_collection(&self.name())?;
        self.reset();
        Ok(())
    }

    /// Chooses between native translation and the SQL bridge for `criteria`.
    pub(crate) fn query_filter(
        &self,
        db: &Database,
        codec: &DocumentCodec,
        criteria: Criteria,
    ) -> QueryFilter {
        let searchable = self.inner.searchable.read().clone();
        match Translator::new(&searchable, codec.is_encrypted()).plan(&criteria) {
            QueryPlan::Native(sql) => {
                log::debug!("Native filter for {}: {:?}", self.name(), sql);
                QueryFilter {
                    sql,
                    registration: None,
                }
            }
            QueryPlan::Interpreted => {
                let registration = db.register_with_codec(criteria, codec.clone());
                log::debug!(
                    "Interpreted filter for {} through {}",
                    self.name(),
                    registration.id()
                );
                QueryFilter {
                    sql: format!(
                        "{}({}, document)",
                        CRITERIA_FUNCTION,
                        quote_literal(registration.id())
                    ),
                    registration: Some(registration),
                }
            }
        }
    }

    fn select_rows(&self, db: &Database, where_clause: &str) -> PocketResult<Vec<(i64, String)>> {
        let sql = format!(
            "SELECT id, document FROM {}{} ORDER BY id",
            self.table(),
            where_clause
        );
        db.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (rowid, stored) = row?;
                out.push((rowid, stored.unwrap_or_default()));
            }
            Ok(out)
        })
        .map_err(|e| {
            log::error!("Scan of {} failed: {}", self.name(), e);
            e
        })
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("id_mode", &self.id_mode())
            .finish()
    }
}

fn text_value(value: &Option<String>) -> SqlValue {
    match value {
        Some(text) => SqlValue::Text(text.clone()),
        None => SqlValue::Null,
    }
}

fn rollback(db: &Database) {
    if let Err(e) = db.with_connection(|conn| Ok(conn.execute_batch("ROLLBACK")?)) {
        log::warn!("Rollback failed: {}", e);
    }
}


/// A document holding only the identifier of a stored row that does not
/// decode. Encrypted rows keep their `_id` in clear.
fn stored_identity(stored: &str) -> Document {
    let mut document = Document::new();
    if let Some(id) = serde_json::from_str::<Value>(stored)
        .ok()
        .and_then(|value| value.get(DOC_ID).cloned())
        .filter(|id| !id.is_null())
    {
        document.set_id(id);
    }
    document
}
