//! # PocketDB - Document Store on SQLite
//!
//! PocketDB keeps schemaless JSON documents in SQLite tables and queries them
//! with a MongoDB-like criteria language.
//!
//! ## Key Features
//!
//! - **Embedded**: a database is a single SQLite file, or lives in memory
//! - **Native Queries**: criteria are rewritten into SQL over `json_extract`
//!   whenever possible and evaluated row by row otherwise
//! - **Identifiers**: automatic UUIDs, caller supplied ids or prefixed counters
//! - **Encryption**: optional AES-256 encryption of stored documents
//! - **Hooks**: before and after hooks on insert, update and remove, with veto
//! - **Searchable Fields**: plain or hashed side columns for fast lookups
//! - **Cursors**: lazy paging, sorting, projection and batched population of
//!   references, across databases of the same client
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pocketdb::database::Database;
//! use pocketdb::doc;
//! use pocketdb::filter::field;
//!
//! let db = Database::open("shop.sqlite")?;
//! let users = db.collection("users")?;
//!
//! users.insert(doc! { "name": "Alice", "age": 25 })?;
//! users.insert(doc! { "name": "Bob", "age": 31 })?;
//!
//! for user in users.find(field("age").gt(26))? {
//!     println!("{}", user?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: a directory of databases
//! - [`database`]: connections, configuration, indexes and attachments
//! - [`collection`]: the write path, hooks and searchable fields
//! - [`filter`]: criteria, translation to SQL and in-process matching
//! - [`cursor`]: query results
//! - [`codec`]: storage encoding and encryption
//! - [`common`]: documents and shared value semantics
//! - [`errors`]: error types

pub mod client;
pub mod codec;
pub mod collection;
pub mod common;
pub mod cursor;
pub mod database;
pub mod errors;
pub mod filter;

pub use serde_json;

pub use client::Client;
pub use collection::Collection;
pub use common::Document;
pub use cursor::Cursor;
pub use database::Database;
pub use errors::{ErrorKind, PocketError, PocketResult};

#[cfg(test)]
mod tests {
    #[ctor::ctor]
    fn init() {
        colog::init();
    }
}
