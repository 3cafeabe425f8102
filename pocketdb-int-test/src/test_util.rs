use pocketdb::client::Client;
use pocketdb::database::Database;
use pocketdb::errors::{ErrorKind, PocketError, PocketResult};
use pocketdb::Document;
use sha2::{Digest, Sha256};
use std::backtrace::Backtrace;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;

/// Runs a test between its setup and teardown.
///
/// The teardown runs even when the test fails. Failures and panics are
/// reported with the elapsed time and the backtrace of the run before the
/// test panics.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> PocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> PocketResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> PocketResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let start_time = Instant::now();

    let result = std::panic::catch_unwind(|| {
        let backtrace = Backtrace::capture();
        match before() {
            Ok(ctx) => match test(ctx.clone()) {
                Ok(_) => after(ctx).map_err(|e| {
                    (format!("After run failed: {:?}", e), backtrace.to_string())
                }),
                Err(e) => {
                    let _ = after(ctx);
                    Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                }
            },
            Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
        }
    });

    let elapsed = start_time.elapsed();
    let (error, backtrace) = match result {
        Ok(Ok(_)) => return,
        Ok(Err((e, bt))) => (e, bt),
        Err(panic_err) => {
            let message = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            (format!("Panic: {}", message), Backtrace::capture().to_string())
        }
    };

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {:?}", elapsed);
    eprintln!("Error: {}", error);
    if !backtrace.is_empty() && !backtrace.contains("disabled") {
        eprintln!("\nBacktrace:\n{}", backtrace);
    }
    eprintln!("=====================================================\n");

    panic!("Test failed: {}", error);
}

/// A database in a private temporary directory. The directory is removed
/// when the last clone of the context goes away.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
    db: Database,
}

impl TestContext {
    pub fn new(dir: TempDir, db: Database) -> Self {
        Self {
            dir: Arc::new(dir),
            db,
        }
    }

    pub fn path(&self) -> &str {
        self.dir.path().to_str().unwrap_or_default()
    }

    pub fn db(&self) -> Database {
        self.db.clone()
    }

    /// A path for another database file inside the context directory.
    pub fn file(&self, name: &str) -> String {
        format!("{}/{}.sqlite", self.path(), name)
    }

    /// A client over the context directory.
    pub fn client(&self) -> PocketResult<Client> {
        Client::open(self.path())
    }
}

fn temp_dir() -> PocketResult<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("pocketdb-{}", uuid::Uuid::new_v4().simple()))
        .tempdir()
        .map_err(|e| PocketError::new(&format!("Cannot create temp dir: {}", e), ErrorKind::IOError))
}

/// Opens a fresh on-disk database in WAL mode.
pub fn create_test_context() -> PocketResult<TestContext> {
    let dir = temp_dir()?;
    let path = format!("{}/test.sqlite", dir.path().to_str().unwrap_or_default());
    let db = Database::builder().journal_mode("WAL").open(&path)?;
    Ok(TestContext::new(dir, db))
}

/// Opens a fresh on-disk database whose documents are encrypted by default.
pub fn create_encrypted_test_context() -> PocketResult<TestContext> {
    let dir = temp_dir()?;
    let path = format!("{}/secure.sqlite", dir.path().to_str().unwrap_or_default());
    let db = Database::builder()
        .encryption_key("correct horse battery staple")
        .open(&path)?;
    Ok(TestContext::new(dir, db))
}

pub fn create_memory_context() -> PocketResult<TestContext> {
    let dir = temp_dir()?;
    let db = Database::open_in_memory()?;
    Ok(TestContext::new(dir, db))
}

pub fn cleanup(ctx: TestContext) -> PocketResult<()> {
    ctx.db().close()
}

/// Hex SHA-256 of `text`, as stored in hashed searchable columns.
pub fn sha256(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Collects the documents handed to a hook.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Document>>>,
}

impl Recorder {
    pub fn push(&self, document: &Document) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(document.clone());
        }
    }

    pub fn documents(&self) -> Vec<Document> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}
