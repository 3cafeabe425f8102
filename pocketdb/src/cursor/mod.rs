//! Lazy query results: paging, sorting, projection and batched reference
//! population.

mod cursor;
mod population;
mod projection;

pub use cursor::{Cursor, CursorIntoIter, CursorIter};
pub(crate) use population::populate_documents;
pub use population::Populate;
pub use projection::Projection;
