//! Query criteria.
//!
//! Criteria are parsed from the MongoDB-like JSON grammar or built with the
//! fluent API, then either rewritten into native SQL by the translator or
//! evaluated row by row by the matcher.
//!
//! ```rust,ignore
//! use pocketdb::filter::{field, or};
//!
//! let criteria = or(vec![field("age").gt(26), field("name").eq("Alice")]);
//! let cursor = collection.find(criteria)?;
//! ```

mod criteria;
mod fluent;
mod fuzzy;
mod matcher;
mod translator;

pub use criteria::{Criteria, DocumentPredicate, ValuePredicate};
pub use fluent::*;
pub(crate) use translator::*;
