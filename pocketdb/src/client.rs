use crate::collection::Collection;
use crate::common::{DATABASE_FILE_EXTENSION, MEMORY_PATH};
use crate::database::{Database, DatabaseConfig};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Entry point to a directory of databases, one `<name>.sqlite` file each.
///
/// With the path `:memory:` every selected database lives in memory for as
/// long as the client keeps it open.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::client::Client;
///
/// let client = Client::open("/var/data")?;
/// let users = client.select_collection("shop", "users")?;
/// println!("{:?}", client.list_dbs()?);
/// client.close()?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Opens a client over `path`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `IOError` if the directory cannot be created.
    pub fn open(path: &str) -> PocketResult<Client> {
        Client::with_config(path, DatabaseConfig::new())
    }

    /// Opens a client whose databases all use `config`.
    pub fn with_config(path: &str, config: DatabaseConfig) -> PocketResult<Client> {
        let path = if path == MEMORY_PATH {
            path.to_string()
        } else {
            let trimmed = path.trim_end_matches(['/', '\\']);
            let trimmed = if trimmed.is_empty() { path } else { trimmed };
            std::fs::create_dir_all(trimmed).map_err(|e| {
                log::error!("Failed to create database directory {}: {}", trimmed, e);
                PocketError::from(e)
            })?;
            trimmed.to_string()
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                path,
                config,
                databases: Mutex::new(IndexMap::new()),
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Client {
        Client { inner }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn is_in_memory(&self) -> bool {
        self.inner.path == MEMORY_PATH
    }

    /// Returns the database `name`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns `InvalidName` unless `name` is made of letters, digits,
    /// underscores and hyphens.
    pub fn select_db(&self, name: &str) -> PocketResult<Database> {
        validate_database_name(name)?;

        let mut databases = self.inner.databases.lock();
        if let Some(db) = databases.get(name) {
            if !db.is_closed() {
                return Ok(db.clone());
            }
        }

        let path = if self.is_in_memory() || name == MEMORY_PATH {
            MEMORY_PATH.to_string()
        } else {
            format!("{}/{}.{}", self.inner.path, name, DATABASE_FILE_EXTENSION)
        };
        let db = Database::with_config(&path, self.inner.config.clone())?;
        db.set_client(Arc::downgrade(&self.inner));
        log::debug!("Selected database {} at {}", name, path);
        databases.insert(name.to_string(), db.clone());
        Ok(db)
    }

    pub fn select_collection(&self, database: &str, collection: &str) -> PocketResult<Collection> {
        self.select_db(database)?.collection(collection)
    }

    /// Names of the available databases. In memory these are the databases
    /// selected so far, on disk the `*.sqlite` files of the directory in name
    /// order.
    pub fn list_dbs(&self) -> PocketResult<Vec<String>> {
        if self.is_in_memory() {
            return Ok(self.inner.databases.lock().keys().cloned().collect());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.inner.path)? {
            let path = entry?.path();
            if !path.is_file() || !is_database_file(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Closes every database opened through this client.
    pub fn close(&self) -> PocketResult<()> {
        self.inner.close()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("path", &self.inner.path).finish()
    }
}

pub(crate) struct ClientInner {
    path: String,
    config: DatabaseConfig,
    databases: Mutex<IndexMap<String, Database>>,
}

impl ClientInner {
    fn close(&self) -> PocketResult<()> {
        let databases: Vec<Database> = self.databases.lock().drain(..).map(|(_, db)| db).collect();
        let mut first_error = None;
        for db in databases {
            if let Err(e) = db.close() {
                log::warn!("Failed to close database {}: {}", db.path(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to close client {}: {}", self.path, e);
        }
    }
}

fn validate_database_name(name: &str) -> PocketResult<()> {
    let valid = name == MEMORY_PATH
        || (!name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    if valid {
        return Ok(());
    }
    log::error!("Invalid database name {:?}", name);
    Err(PocketError::new(
        &format!("Invalid database name {:?}", name),
        ErrorKind::InvalidName,
    ))
}

fn is_database_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(DATABASE_FILE_EXTENSION)
}
