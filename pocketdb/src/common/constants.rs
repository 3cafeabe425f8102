// doc constants
pub const DOC_ID: &str = "_id";
pub const FIELD_SEPARATOR: char = '.';

// storage constants
pub const SEARCHABLE_PREFIX: &str = "si_";
pub const MEMORY_PATH: &str = ":memory:";
pub const DATABASE_FILE_EXTENSION: &str = "sqlite";
pub const SQLITE_SEQUENCE: &str = "sqlite_sequence";

// encryption wrapper fields
pub const ENCRYPTED_DATA: &str = "encrypted_data";
pub const ENCRYPTED_IV: &str = "iv";

// engine bridge functions
pub const CRITERIA_FUNCTION: &str = "document_criteria";
pub const DOCUMENT_KEY_FUNCTION: &str = "document_key";

// id generation
pub const PREFIX_ID_WIDTH: usize = 6;

// cursor
pub const CURSOR_PAGE_SIZE: i64 = 256;
