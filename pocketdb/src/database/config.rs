use crate::common::MEMORY_PATH;
use crate::database::Database;
use crate::errors::{ErrorKind, PocketError, PocketResult};
use parking_lot::RwLock;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;

const JOURNAL_MODES: [&str; 6] = ["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SYNCHRONOUS_MODES: [&str; 4] = ["OFF", "NORMAL", "FULL", "EXTRA"];

/// Connection settings shared by every database opened with it.
///
/// The defaults favour concurrent readers: write-ahead logging, `NORMAL`
/// synchronous mode, 4096 byte pages and a five second busy timeout.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::database::DatabaseConfig;
///
/// let config = DatabaseConfig::new();
/// config.set_encryption_key(Some("secret"))?;
/// let client = Client::with_config("/var/data", config);
/// ```
#[derive(Clone)]
pub struct DatabaseConfig {
    inner: Arc<DatabaseConfigInner>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("encryption_key", &self.inner.encryption_key.read().as_ref().map(|_| "<redacted>"))
            .field("journal_mode", &*self.inner.journal_mode.read())
            .field("synchronous", &*self.inner.synchronous.read())
            .field("page_size", &*self.inner.page_size.read())
            .field("busy_timeout", &*self.inner.busy_timeout.read())
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        DatabaseConfig {
            inner: Arc::new(DatabaseConfigInner::new()),
        }
    }

    /// The default encryption key for collections without their own key.
    pub fn encryption_key(&self) -> Option<String> {
        self.inner.encryption_key.read().clone()
    }

    /// Sets the default encryption key. `None` or an empty key disables
    /// encryption.
    pub fn set_encryption_key(&self, key: Option<&str>) -> PocketResult<()> {
        *self.inner.encryption_key.write() = key.filter(|k| !k.is_empty()).map(str::to_string);
        Ok(())
    }

    pub fn journal_mode(&self) -> String {
        self.inner.journal_mode.read().clone()
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` for a mode SQLite does not know.
    pub fn set_journal_mode(&self, mode: &str) -> PocketResult<()> {
        let mode = mode.to_uppercase();
        if !JOURNAL_MODES.contains(&mode.as_str()) {
            log::error!("Invalid journal mode {}", mode);
            return Err(PocketError::new(
                &format!("Invalid journal mode {}", mode),
                ErrorKind::InvalidOperation,
            ));
        }
        *self.inner.journal_mode.write() = mode;
        Ok(())
    }

    pub fn synchronous(&self) -> String {
        self.inner.synchronous.read().clone()
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` for a mode SQLite does not know.
    pub fn set_synchronous(&self, mode: &str) -> PocketResult<()> {
        let mode = mode.to_uppercase();
        if !SYNCHRONOUS_MODES.contains(&mode.as_str()) {
            log::error!("Invalid synchronous mode {}", mode);
            return Err(PocketError::new(
                &format!("Invalid synchronous mode {}", mode),
                ErrorKind::InvalidOperation,
            ));
        }
        *self.inner.synchronous.write() = mode;
        Ok(())
    }

    pub fn page_size(&self) -> u32 {
        *self.inner.page_size.read()
    }

    /// # Errors
    ///
    /// Returns `InvalidOperation` unless `size` is a power of two between 512
    /// and 65536.
    pub fn set_page_size(&self, size: u32) -> PocketResult<()> {
        if !(512..=65536).contains(&size) || !size.is_power_of_two() {
            log::error!("Invalid page size {}", size);
            return Err(PocketError::new(
                &format!("Invalid page size {}, expected a power of two between 512 and 65536", size),
                ErrorKind::InvalidOperation,
            ));
        }
        *self.inner.page_size.write() = size;
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        *self.inner.busy_timeout.read()
    }

    pub fn set_busy_timeout(&self, timeout: Duration) -> PocketResult<()> {
        *self.inner.busy_timeout.write() = timeout;
        Ok(())
    }

    /// Applies the connection pragmas. The page size goes first so that it
    /// takes effect on a fresh file.
    pub(crate) fn apply(&self, conn: &Connection) -> PocketResult<()> {
        conn.pragma_update(None, "page_size", self.page_size())?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", self.journal_mode(), |row| {
            row.get(0)
        })?;
        log::debug!("Journal mode is {}", mode);
        conn.pragma_update(None, "synchronous", self.synchronous())?;
        conn.busy_timeout(self.busy_timeout())?;
        Ok(())
    }
}

struct DatabaseConfigInner {
    encryption_key: RwLock<Option<String>>,
    journal_mode: RwLock<String>,
    synchronous: RwLock<String>,
    page_size: RwLock<u32>,
    busy_timeout: RwLock<Duration>,
}

impl DatabaseConfigInner {
    fn new() -> Self {
        DatabaseConfigInner {
            encryption_key: RwLock::new(None),
            journal_mode: RwLock::new("WAL".to_string()),
            synchronous: RwLock::new("NORMAL".to_string()),
            page_size: RwLock::new(4096),
            busy_timeout: RwLock::new(Duration::from_secs(5)),
        }
    }
}

/// Builder for opening a [`Database`].
///
/// Configuration errors are captured and reported by `open`.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::database::Database;
///
/// let db = Database::builder()
///     .encryption_key("secret")
///     .journal_mode("DELETE")
///     .open("/var/data/app.sqlite")?;
/// ```
#[derive(Default)]
pub struct DatabaseBuilder {
    error: Option<PocketError>,
    config: DatabaseConfig,
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        DatabaseBuilder {
            error: None,
            config: DatabaseConfig::new(),
        }
    }

    fn capture(mut self, result: PocketResult<()>) -> Self {
        if self.error.is_none() {
            if let Err(e) = result {
                self.error = Some(e);
            }
        }
        self
    }

    /// Sets the default encryption key of the database.
    pub fn encryption_key(self, key: &str) -> Self {
        let result = self.config.set_encryption_key(Some(key));
        self.capture(result)
    }

    pub fn journal_mode(self, mode: &str) -> Self {
        let result = self.config.set_journal_mode(mode);
        self.capture(result)
    }

    pub fn synchronous(self, mode: &str) -> Self {
        let result = self.config.set_synchronous(mode);
        self.capture(result)
    }

    pub fn page_size(self, size: u32) -> Self {
        let result = self.config.set_page_size(size);
        self.capture(result)
    }

    pub fn busy_timeout(self, timeout: Duration) -> Self {
        let result = self.config.set_busy_timeout(timeout);
        self.capture(result)
    }

    /// Finishes configuration without opening anything, for use with
    /// [`crate::client::Client::with_config`].
    pub fn build(self) -> PocketResult<DatabaseConfig> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.config),
        }
    }

    /// Opens or creates the database file at `path`. `:memory:` opens a
    /// private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, or `BackendError` if SQLite
    /// cannot open the file.
    pub fn open(self, path: &str) -> PocketResult<Database> {
        let config = self.build()?;
        Database::with_config(path, config)
    }

    pub fn open_in_memory(self) -> PocketResult<Database> {
        self.open(MEMORY_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::new();
        assert_eq!(config.journal_mode(), "WAL");
        assert_eq!(config.synchronous(), "NORMAL");
        assert_eq!(config.page_size(), 4096);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.encryption_key().is_none());
    }

    #[test]
    fn test_empty_key_disables_encryption() {
        let config = DatabaseConfig::new();
        config.set_encryption_key(Some("")).unwrap();
        assert!(config.encryption_key().is_none());
        config.set_encryption_key(Some("k")).unwrap();
        assert_eq!(config.encryption_key(), Some("k".to_string()));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = DatabaseConfig::new();
        assert!(config.set_journal_mode("fast").is_err());
        assert!(config.set_synchronous("sometimes").is_err());
        assert!(config.set_page_size(1000).is_err());
        assert!(config.set_page_size(256).is_err());
        assert!(config.set_journal_mode("delete").is_ok());
        assert_eq!(config.journal_mode(), "DELETE");
    }

    #[test]
    fn test_clones_share_state() {
        let config = DatabaseConfig::new();
        let clone = config.clone();
        clone.set_page_size(8192).unwrap();
        assert_eq!(config.page_size(), 8192);
    }

    #[test]
    fn test_builder_reports_first_error() {
        let err = DatabaseBuilder::new()
            .page_size(3)
            .journal_mode("nope")
            .build()
            .unwrap_err();
        assert!(err.message().contains("page size"));
    }

    #[test]
    fn test_builder_opens_in_memory() {
        let db = DatabaseBuilder::new()
            .encryption_key("secret")
            .open_in_memory()
            .unwrap();
        assert!(db.is_in_memory());
        assert_eq!(db.encryption_key(), Some("secret".to_string()));
    }

    #[test]
    fn test_apply_sets_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pragmas.sqlite");
        let conn = Connection::open(&path).unwrap();
        let config = DatabaseConfig::new();
        config.apply(&conn).unwrap();

        let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
        assert_eq!(mode.to_uppercase(), "WAL");
        let sync: i64 = conn.query_row("PRAGMA synchronous", [], |r| r.get(0)).unwrap();
        assert_eq!(sync, 1);
    }
}
