use crate::client::{Client, ClientInner};
use crate::codec::DocumentCodec;
use crate::collection::Collection;
use crate::common::{json_extract, quote_ident, Document, MEMORY_PATH, SQLITE_SEQUENCE};
use crate::database::registry::{
    evaluate_document, live_databases, purge_criteria, register_criteria, register_functions, track,
};
use crate::database::{CriteriaRegistration, DatabaseBuilder, DatabaseConfig};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use crate::filter::IntoCriteria;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::sync::{Arc, Weak};

/// An open SQLite database holding one table per collection.
///
/// `Database` is a cheap handle; clones share the same connection. Every
/// statement goes through that single connection, so callers on several
/// threads are serialized.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::database::Database;
/// use pocketdb::doc;
///
/// let db = Database::open("/var/data/app.sqlite")?;
/// let users = db.collection("users")?;
/// users.insert(doc!{ "name": "Alice", "age": 25 })?;
/// db.close()?;
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Returns a builder for configuring the database before opening it.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Opens or creates the database at `path` with the default settings.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if SQLite cannot open the file.
    pub fn open(path: &str) -> PocketResult<Database> {
        DatabaseBuilder::new().open(path)
    }

    pub fn open_in_memory() -> PocketResult<Database> {
        DatabaseBuilder::new().open_in_memory()
    }

    /// Opens the database at `path` with an explicit configuration.
    pub fn with_config(path: &str, config: DatabaseConfig) -> PocketResult<Database> {
        let conn = open_connection(path)?;
        config.apply(&conn).map_err(|e| {
            log::error!("Failed to configure database {}: {}", path, e);
            e
        })?;
        register_functions(&conn).map_err(|e| {
            log::error!("Failed to register SQL functions: {}", e);
            PocketError::from(e)
        })?;

        let inner = Arc::new(DatabaseInner {
            path: path.to_string(),
            encryption_key: RwLock::new(config.encryption_key()),
            config,
            connection: Mutex::new(Some(conn)),
            collections: DashMap::new(),
            client: RwLock::new(Weak::new()),
        });
        track(&inner);
        log::debug!("Opened database {}", path);
        Ok(Database { inner })
    }

    pub(crate) fn from_inner(inner: Arc<DatabaseInner>) -> Database {
        Database { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<DatabaseInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    pub fn is_in_memory(&self) -> bool {
        self.inner.path == MEMORY_PATH
    }

    pub fn is_closed(&self) -> bool {
        self.inner.connection.lock().is_none()
    }

    /// The default encryption key for collections without their own key.
    pub fn encryption_key(&self) -> Option<String> {
        self.inner.encryption_key.read().clone()
    }

    /// Changes the default encryption key. Rows written under the previous
    /// key stop decoding for collections that rely on the default.
    pub fn set_encryption_key(&self, key: Option<&str>) {
        *self.inner.encryption_key.write() = key.filter(|k| !k.is_empty()).map(str::to_string);
    }

    pub(crate) fn codec(&self) -> DocumentCodec {
        DocumentCodec::new(self.encryption_key().as_deref())
    }

    /// The client this database was selected from, if any.
    pub fn client(&self) -> Option<Client> {
        self.inner.client.read().upgrade().map(Client::from_inner)
    }

    pub(crate) fn set_client(&self, client: Weak<ClientInner>) {
        *self.inner.client.write() = client;
    }

    /// Runs `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` once the database has been closed.
    pub(crate) fn with_connection<R, F>(&self, f: F) -> PocketResult<R>
    where
        F: FnOnce(&mut Connection) -> PocketResult<R>,
    {
        let mut guard = self.inner.connection.lock();
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => {
                log::error!("Database {} is closed", self.inner.path);
                Err(PocketError::new(
                    &format!("Database {} is closed", self.inner.path),
                    ErrorKind::DatabaseClosed,
                ))
            }
        }
    }

    /// Creates the table of a collection if needed and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` unless `name` is made of ASCII letters, digits
    /// and underscores.
    pub fn create_collection(&self, name: &str) -> PocketResult<Collection> {
        validate_identifier(name, "collection")?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, document TEXT)",
            quote_ident(name)
        );
        self.with_connection(|conn| {
            conn.execute_batch(&sql).map_err(|e| {
                log::error!("Failed to create collection {}: {}", name, e);
                PocketError::from(e)
            })
        })?;

        let collection = self
            .inner
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Collection::new(name, self.downgrade()))
            .value()
            .clone();
        Ok(collection)
    }

    /// Returns the collection named `name`, creating it on first use.
    pub fn collection(&self, name: &str) -> PocketResult<Collection> {
        if let Some(collection) = self.inner.collections.get(name) {
            return Ok(collection.value().clone());
        }
        self.create_collection(name)
    }

    /// Drops the table of a collection. Cached handles lose their hooks and
    /// searchable configuration.
    pub fn drop_collection(&self, name: &str) -> PocketResult<()> {
        validate_identifier(name, "collection")?;
        self.with_connection(|conn| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
                .map_err(|e| {
                    log::error!("Failed to drop collection {}: {}", name, e);
                    PocketError::from(e)
                })
        })?;
        if let Some((_, collection)) = self.inner.collections.remove(name) {
            collection.reset();
        }
        Ok(())
    }

    pub fn has_collection(&self, name: &str) -> PocketResult<bool> {
        Ok(self.list_collection_names()?.iter().any(|n| n == name))
    }

    /// Names of every collection table in name order.
    pub fn list_collection_names(&self) -> PocketResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name != ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map([SQLITE_SEQUENCE], |row| row.get::<_, String>(0))?;
            let mut names = Vec::new();
            for name in rows {
                names.push(name?);
            }
            Ok(names)
        })
    }

    pub fn list_collections(&self) -> PocketResult<Vec<Collection>> {
        self.list_collection_names()?
            .iter()
            .map(|name| self.collection(name))
            .collect()
    }

    pub(crate) fn rename_cached(&self, old_name: &str, new_name: &str) {
        if let Some((_, collection)) = self.inner.collections.remove(old_name) {
            self.inner.collections.insert(new_name.to_string(), collection);
        }
    }

    /// Creates an expression index over `json_extract(document, '$.field')`.
    /// Returns the index name, `idx_<collection>_<field>` unless given.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let name = db.create_json_index("users", "address.city", None)?;
    /// assert_eq!(name, "idx_users_address_city");
    /// ```
    pub fn create_json_index(
        &self,
        collection: &str,
        field: &str,
        name: Option<&str>,
    ) -> PocketResult<String> {
        validate_identifier(collection, "collection")?;
        let name = match name {
            Some(name) => name.to_string(),
            None => default_index_name(collection, field),
        };
        let sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&name),
            quote_ident(collection),
            json_extract(field)
        );
        self.with_connection(|conn| {
            conn.execute_batch(&sql).map_err(|e| {
                log::error!("Failed to create index {}: {}", name, e);
                PocketError::from(e)
            })
        })?;
        Ok(name)
    }

    pub fn drop_index(&self, name: &str) -> PocketResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch(&format!("DROP INDEX IF EXISTS {}", quote_ident(name)))
                .map_err(|e| {
                    log::error!("Failed to drop index {}: {}", name, e);
                    PocketError::from(e)
                })
        })
    }

    /// Quotes a validated identifier for use in hand written SQL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for anything but ASCII letters, digits and
    /// underscores.
    pub fn quote_identifier(&self, name: &str) -> PocketResult<String> {
        validate_identifier(name, "identifier")?;
        Ok(quote_ident(name))
    }

    /// Rebuilds the database file to reclaim free pages.
    pub fn vacuum(&self) -> PocketResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch("VACUUM").map_err(|e| {
                log::error!("Vacuum failed: {}", e);
                PocketError::from(e)
            })
        })
    }

    /// Attaches another database file under `alias`. Returns false when
    /// SQLite refuses the attachment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` for an invalid alias and `DatabaseClosed` once
    /// closed.
    pub fn attach(&self, path: &str, alias: &str) -> PocketResult<bool> {
        validate_identifier(alias, "alias")?;
        let sql = format!("ATTACH DATABASE ?1 AS {}", quote_ident(alias));
        self.with_connection(|conn| match conn.execute(&sql, [path]) {
            Ok(_) => Ok(true),
            Err(e) => {
                log::warn!("Failed to attach {} as {}: {}", path, alias, e);
                Ok(false)
            }
        })
    }

    pub fn detach(&self, alias: &str) -> PocketResult<bool> {
        validate_identifier(alias, "alias")?;
        let sql = format!("DETACH DATABASE {}", quote_ident(alias));
        self.with_connection(|conn| match conn.execute_batch(&sql) {
            Ok(_) => Ok(true),
            Err(e) => {
                log::warn!("Failed to detach {}: {}", alias, e);
                Ok(false)
            }
        })
    }

    /// Attaches `path` as `alias` for the duration of `f`. The alias is
    /// detached on every exit path, and the result of `f` is returned after
    /// detaching.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let total: i64 = db.attach_once("/var/data/archive.sqlite", "archive", |db, alias| {
    ///     db.execute_scalar(&format!("SELECT COUNT(*) FROM \"{}\".\"orders\"", alias))
    /// })?;
    /// ```
    pub fn attach_once<R, F>(&self, path: &str, alias: &str, f: F) -> PocketResult<R>
    where
        F: FnOnce(&Database, &str) -> PocketResult<R>,
    {
        if !self.attach(path, alias)? {
            log::error!("Could not attach {} as {}", path, alias);
            return Err(PocketError::new(
                &format!("Could not attach {} as {}", path, alias),
                ErrorKind::BackendError,
            ));
        }
        let _guard = DetachGuard {
            database: self,
            alias,
        };
        f(self, alias)
    }

    /// Runs a statement returning a single integer, such as a count over an
    /// attached database.
    pub fn execute_scalar(&self, sql: &str) -> PocketResult<i64> {
        self.with_connection(|conn| {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0)).map_err(|e| {
                log::error!("Statement failed: {}", e);
                PocketError::from(e)
            })
        })
    }

    /// Registers criteria so that SQL can evaluate them through
    /// `document_criteria('<id>', document)` while the registration lives.
    pub fn register_criteria(&self, criteria: impl IntoCriteria) -> PocketResult<CriteriaRegistration> {
        let criteria = criteria.into_criteria()?;
        Ok(register_criteria(&self.downgrade(), criteria, self.codec()))
    }

    pub(crate) fn register_with_codec(
        &self,
        criteria: crate::filter::Criteria,
        codec: DocumentCodec,
    ) -> CriteriaRegistration {
        register_criteria(&self.downgrade(), criteria, codec)
    }

    /// Evaluates registered criteria against a document. Unknown ids are no
    /// match.
    pub fn call_criteria(&self, id: &str, document: &Document) -> bool {
        evaluate_document(id, document)
    }

    /// Closes the connection and releases every criteria it registered.
    /// Closing twice is a no-op.
    pub fn close(&self) -> PocketResult<()> {
        self.inner.close()
    }

    /// Closes every database still open in this process. Failures are
    /// logged and skipped.
    pub fn close_all() {
        for inner in live_databases() {
            if let Err(e) = inner.close() {
                log::warn!("Failed to close database {}: {}", inner.path, e);
            }
        }
    }

    /// Closes the database and deletes its files. In-memory databases are
    /// only closed.
    pub fn drop(&self) -> PocketResult<()> {
        self.close()?;
        if self.is_in_memory() {
            return Ok(());
        }
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let file = format!("{}{}", self.inner.path, suffix);
            match std::fs::remove_file(&file) {
                Ok(_) => log::debug!("Removed {}", file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!("Failed to remove {}: {}", file, e);
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) struct DatabaseInner {
    path: String,
    config: DatabaseConfig,
    encryption_key: RwLock<Option<String>>,
    connection: Mutex<Option<Connection>>,
    collections: DashMap<String, Collection>,
    client: RwLock<Weak<ClientInner>>,
}

impl DatabaseInner {
    fn close(&self) -> PocketResult<()> {
        let conn = self.connection.lock().take();
        purge_criteria(self as *const DatabaseInner);
        self.collections.clear();
        match conn {
            Some(conn) => conn.close().map_err(|(_, e)| {
                log::error!("Failed to close database {}: {}", self.path, e);
                PocketError::from(e)
            }),
            None => Ok(()),
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        purge_criteria(self as *const DatabaseInner);
    }
}

struct DetachGuard<'a> {
    database: &'a Database,
    alias: &'a str,
}

impl Drop for DetachGuard<'_> {
    fn drop(&mut self) {
        match self.database.detach(self.alias) {
            Ok(true) => {}
            Ok(false) => log::warn!("Alias {} was not detached", self.alias),
            Err(e) => log::warn!("Failed to detach {}: {}", self.alias, e),
        }
    }
}

fn open_connection(path: &str) -> PocketResult<Connection> {
    let result = if path == MEMORY_PATH {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    };
    result.map_err(|e| {
        log::error!("Failed to open database {}: {}", path, e);
        PocketError::from(e)
    })
}

/// Accepts non-empty names of ASCII letters, digits and underscores.
pub(crate) fn validate_identifier(name: &str, what: &str) -> PocketResult<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Ok(());
    }
    log::error!("Invalid {} name {:?}", what, name);
    Err(PocketError::new(
        &format!("Invalid {} name {:?}", what, name),
        ErrorKind::InvalidName,
    ))
}

fn default_index_name(collection: &str, field: &str) -> String {
    let field: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("idx_{}_{}", collection, field)
}
