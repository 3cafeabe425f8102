use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for PocketDB operations
///
/// Every failure surfaced by the library is tagged with one of these kinds so
/// callers can tell programmer errors (bad names, malformed criteria) apart
/// from storage failures.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::errors::{PocketError, ErrorKind, PocketResult};
///
/// fn example() -> PocketResult<()> {
///     Err(PocketError::new("Invalid collection name", ErrorKind::InvalidName))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    /// A collection, database, alias or identifier name failed validation
    InvalidName,
    /// A document identifier is missing or malformed
    InvalidId,
    /// A document could not be serialized or deserialized
    EncodingError,
    /// Encryption of a document payload failed
    SecurityError,
    /// Malformed criteria or misuse of a criteria operator
    FilterError,
    /// The criteria used an operator that does not exist
    UnsupportedOperator,
    /// The storage engine reported a failure
    BackendError,
    /// The database connection has been closed
    DatabaseClosed,
    /// The requested resource was not found
    NotFound,
    /// The operation is not valid in the current context
    InvalidOperation,
    /// Generic IO error
    IOError,
    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidName => write!(f, "Invalid name"),
            ErrorKind::InvalidId => write!(f, "Invalid ID"),
            ErrorKind::EncodingError => write!(f, "Encoding error"),
            ErrorKind::SecurityError => write!(f, "Security error"),
            ErrorKind::FilterError => write!(f, "Filter error"),
            ErrorKind::UnsupportedOperator => write!(f, "Unsupported operator"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::DatabaseClosed => write!(f, "Database closed"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom PocketDB error type.
///
/// `PocketError` carries a message, an [`ErrorKind`], an optional cause and the
/// backtrace captured where the error was created.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::errors::{PocketError, ErrorKind};
///
/// let cause = PocketError::new("disk I/O error", ErrorKind::BackendError);
/// let err = PocketError::new_with_cause("Insert failed", ErrorKind::BackendError, cause);
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct PocketError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<PocketError>>,
    backtrace: Arc<Backtrace>,
}

impl PocketError {
    /// Creates a new `PocketError` with the specified message and error kind.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        PocketError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    /// Creates a new `PocketError` wrapping the error that caused it.
    ///
    /// # Arguments
    ///
    /// * `message` - A description of the error
    /// * `error_kind` - The category of error
    /// * `cause` - The underlying error
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: PocketError) -> Self {
        PocketError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Backtrace::new()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&PocketError> {
        self.cause.as_deref()
    }
}

impl Display for PocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for PocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for PocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for PocketDB operations.
pub type PocketResult<T> = Result<T, PocketError>;

impl From<rusqlite::Error> for PocketError {
    fn from(err: rusqlite::Error) -> Self {
        PocketError::new(&format!("SQLite error: {}", err), ErrorKind::BackendError)
    }
}

impl From<serde_json::Error> for PocketError {
    fn from(err: serde_json::Error) -> Self {
        PocketError::new(&format!("JSON error: {}", err), ErrorKind::EncodingError)
    }
}

impl From<regex::Error> for PocketError {
    fn from(err: regex::Error) -> Self {
        PocketError::new(&format!("Invalid pattern: {}", err), ErrorKind::FilterError)
    }
}

impl From<std::io::Error> for PocketError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::IOError,
        };
        PocketError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<String> for PocketError {
    fn from(msg: String) -> Self {
        PocketError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for PocketError {
    fn from(msg: &str) -> Self {
        PocketError::new(msg, ErrorKind::InternalError)
    }
}
