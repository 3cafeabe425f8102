//! Common types shared by every layer: documents, field paths, value
//! semantics and sort order.

mod constants;
mod document;
mod fields;
mod sort_order;
mod sql;
mod value;

pub use constants::*;
pub use document::*;
pub use fields::*;
pub use sort_order::*;
pub(crate) use sql::*;
pub use value::*;
