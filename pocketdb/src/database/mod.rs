//! The SQLite connection and everything bound to it: configuration,
//! collection tables, indexes, attached databases and the SQL functions that
//! let interpreted criteria take part in native scans.

mod config;
mod database;
mod registry;

pub use config::*;
pub use database::Database;
pub(crate) use database::{validate_identifier, DatabaseInner};
pub use registry::CriteriaRegistration;
