//! Collections and the write path: identifier assignment, hooks, searchable
//! side columns and the insert, save, update and remove procedures.

mod collection;
mod hooks;
mod id_generator;
mod searchable;
mod write_result;

pub use collection::Collection;
pub(crate) use collection::QueryFilter;
pub use hooks::{
    AfterInsertHook, AfterRemoveHook, AfterUpdateHook, BeforeInsertHook, BeforeRemoveHook,
    BeforeUpdateHook, Hook, HookEvent, HookId, HookOutcome,
};
pub use id_generator::IdMode;
pub use searchable::{SearchableField, SearchableFields};
pub use write_result::*;
