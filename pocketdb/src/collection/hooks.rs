use crate::common::Document;
use crate::errors::PocketResult;
use crate::filter::Criteria;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt::{Debug, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Lifecycle points at which collection hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeRemove,
    AfterRemove,
}

impl Display for HookEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HookEvent::BeforeInsert => "beforeInsert",
            HookEvent::AfterInsert => "afterInsert",
            HookEvent::BeforeUpdate => "beforeUpdate",
            HookEvent::AfterUpdate => "afterUpdate",
            HookEvent::BeforeRemove => "beforeRemove",
            HookEvent::AfterRemove => "afterRemove",
        };
        write!(f, "{}", name)
    }
}

/// What a before-hook decided about the document it was shown.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// Keep going with the current document.
    Continue,
    /// Keep going with this document instead. Ignored by remove hooks.
    Replace(Document),
    /// Abandon the operation for this document. Not an error.
    Veto,
}

/// Handle returned by [`crate::collection::Collection::on`], used to remove a
/// single hook again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

pub type BeforeInsertHook = Arc<dyn Fn(&Document) -> PocketResult<HookOutcome> + Send + Sync>;
pub type AfterInsertHook = Arc<dyn Fn(&Value, &Document) -> PocketResult<()> + Send + Sync>;
pub type BeforeUpdateHook =
    Arc<dyn Fn(&mut Criteria, &mut Document) -> PocketResult<()> + Send + Sync>;
pub type AfterUpdateHook = Arc<dyn Fn(&Document, &Document) -> PocketResult<()> + Send + Sync>;
pub type BeforeRemoveHook = Arc<dyn Fn(&Document) -> PocketResult<HookOutcome> + Send + Sync>;
pub type AfterRemoveHook = Arc<dyn Fn(&Document) -> PocketResult<()> + Send + Sync>;

/// A collection lifecycle hook.
///
/// Before-hooks may inspect, replace or veto the document (or rewrite the
/// criteria and data of an update). After-hooks only observe; their errors are
/// logged and never reach the caller.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::collection::{Hook, HookOutcome};
///
/// orders.on(Hook::before_insert(|order| {
///     let qty = order.get("qty").and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(if qty > 0 { HookOutcome::Continue } else { HookOutcome::Veto })
/// }));
/// ```
#[derive(Clone)]
pub enum Hook {
    BeforeInsert(BeforeInsertHook),
    AfterInsert(AfterInsertHook),
    BeforeUpdate(BeforeUpdateHook),
    AfterUpdate(AfterUpdateHook),
    BeforeRemove(BeforeRemoveHook),
    AfterRemove(AfterRemoveHook),
}

impl Hook {
    pub fn before_insert<F>(f: F) -> Hook
    where
        F: Fn(&Document) -> PocketResult<HookOutcome> + Send + Sync + 'static,
    {
        Hook::BeforeInsert(Arc::new(f))
    }

    /// Receives the identifier and the stored document.
    pub fn after_insert<F>(f: F) -> Hook
    where
        F: Fn(&Value, &Document) -> PocketResult<()> + Send + Sync + 'static,
    {
        Hook::AfterInsert(Arc::new(f))
    }

    /// Receives the update criteria and data, both of which it may rewrite.
    pub fn before_update<F>(f: F) -> Hook
    where
        F: Fn(&mut Criteria, &mut Document) -> PocketResult<()> + Send + Sync + 'static,
    {
        Hook::BeforeUpdate(Arc::new(f))
    }

    /// Receives the original and the updated document of every changed row.
    pub fn after_update<F>(f: F) -> Hook
    where
        F: Fn(&Document, &Document) -> PocketResult<()> + Send + Sync + 'static,
    {
        Hook::AfterUpdate(Arc::new(f))
    }

    /// Runs once per matched row. A veto keeps that row only.
    pub fn before_remove<F>(f: F) -> Hook
    where
        F: Fn(&Document) -> PocketResult<HookOutcome> + Send + Sync + 'static,
    {
        Hook::BeforeRemove(Arc::new(f))
    }

    pub fn after_remove<F>(f: F) -> Hook
    where
        F: Fn(&Document) -> PocketResult<()> + Send + Sync + 'static,
    {
        Hook::AfterRemove(Arc::new(f))
    }

    pub fn event(&self) -> HookEvent {
        match self {
            Hook::BeforeInsert(_) => HookEvent::BeforeInsert,
            Hook::AfterInsert(_) => HookEvent::AfterInsert,
            Hook::BeforeUpdate(_) => HookEvent::BeforeUpdate,
            Hook::AfterUpdate(_) => HookEvent::AfterUpdate,
            Hook::BeforeRemove(_) => HookEvent::BeforeRemove,
            Hook::AfterRemove(_) => HookEvent::AfterRemove,
        }
    }
}

impl Debug for Hook {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hook({})", self.event())
    }
}

/// Hooks of one collection in registration order.
///
/// Dispatch works on a snapshot so that a hook may register or remove hooks
/// without deadlocking.
#[derive(Default)]
pub(crate) struct HookRegistry {
    next_id: AtomicU64,
    hooks: RwLock<Vec<(HookId, Hook)>>,
}

impl HookRegistry {
    pub(crate) fn new() -> Self {
        HookRegistry::default()
    }

    pub(crate) fn register(&self, hook: Hook) -> HookId {
        let id = HookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks.write().push((id, hook));
        id
    }

    /// Removes one hook, or every hook of `event` when `id` is `None`.
    /// Returns the number of hooks removed.
    pub(crate) fn unregister(&self, event: HookEvent, id: Option<HookId>) -> usize {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(hook_id, hook)| {
            hook.event() != event || id.map(|id| id != *hook_id).unwrap_or(false)
        });
        before - hooks.len()
    }

    pub(crate) fn clear(&self) {
        self.hooks.write().clear();
    }

    fn snapshot(&self, event: HookEvent) -> Vec<Hook> {
        self.hooks
            .read()
            .iter()
            .filter(|(_, hook)| hook.event() == event)
            .map(|(_, hook)| hook.clone())
            .collect()
    }

    /// Runs the before-insert chain. Returns `None` when a hook vetoed.
    pub(crate) fn before_insert(&self, mut document: Document) -> PocketResult<Option<Document>> {
        for hook in self.snapshot(HookEvent::BeforeInsert) {
            if let Hook::BeforeInsert(f) = hook {
                match f(&document)? {
                    HookOutcome::Continue => {}
                    HookOutcome::Replace(replacement) => document = replacement,
                    HookOutcome::Veto => return Ok(None),
                }
            }
        }
        Ok(Some(document))
    }

    pub(crate) fn after_insert(&self, id: &Value, document: &Document) {
        for hook in self.snapshot(HookEvent::AfterInsert) {
            if let Hook::AfterInsert(f) = hook {
                if let Err(e) = f(id, document) {
                    log::warn!("Ignoring afterInsert hook error: {}", e);
                }
            }
        }
    }

    pub(crate) fn before_update(
        &self,
        criteria: &mut Criteria,
        data: &mut Document,
    ) -> PocketResult<()> {
        for hook in self.snapshot(HookEvent::BeforeUpdate) {
            if let Hook::BeforeUpdate(f) = hook {
                f(criteria, data)?;
            }
        }
        Ok(())
    }

    pub(crate) fn after_update(&self, original: &Document, updated: &Document) {
        for hook in self.snapshot(HookEvent::AfterUpdate) {
            if let Hook::AfterUpdate(f) = hook {
                if let Err(e) = f(original, updated) {
                    log::warn!("Ignoring afterUpdate hook error: {}", e);
                }
            }
        }
    }

    /// Returns false when a hook vetoed removing `document`. Hook errors do
    /// not veto.
    pub(crate) fn allows_remove(&self, document: &Document) -> bool {
        for hook in self.snapshot(HookEvent::BeforeRemove) {
            if let Hook::BeforeRemove(f) = hook {
                match f(document) {
                    Ok(HookOutcome::Veto) => return false,
                    Ok(_) => {}
                    Err(e) => log::warn!("Ignoring beforeRemove hook error: {}", e),
                }
            }
        }
        true
    }

    pub(crate) fn after_remove(&self, document: &Document) {
        for hook in self.snapshot(HookEvent::AfterRemove) {
            if let Hook::AfterRemove(f) = hook {
                if let Err(e) = f(document) {
                    log::warn!("Ignoring afterRemove hook error: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::errors::{ErrorKind, PocketError};
    use crate::filter::field;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_before_insert_runs_in_order_and_replaces() {
        let registry = HookRegistry::new();
        registry.register(Hook::before_insert(|doc| {
            let mut replaced = doc.clone();
            replaced.put("step", 1);
            Ok(HookOutcome::Replace(replaced))
        }));
        registry.register(Hook::before_insert(|doc| {
            assert_eq!(doc.get("step"), Some(&Value::from(1)));
            Ok(HookOutcome::Continue)
        }));

        let result = registry.before_insert(doc! { "name": "Alice" }).unwrap().unwrap();
        assert_eq!(result, doc! { "name": "Alice", "step": 1 });
    }

    #[test]
    fn test_before_insert_veto_stops_chain() {
        let registry = HookRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Hook::before_insert(|_| Ok(HookOutcome::Veto)));
        let counter = calls.clone();
        registry.register(Hook::before_insert(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HookOutcome::Continue)
        }));

        assert!(registry.before_insert(doc! {}).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_before_insert_error_propagates() {
        let registry = HookRegistry::new();
        registry.register(Hook::before_insert(|_| {
            Err(PocketError::new("boom", ErrorKind::InvalidOperation))
        }));
        assert!(registry.before_insert(doc! {}).is_err());
    }

    #[test]
    fn test_after_hook_errors_are_swallowed() {
        let registry = HookRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.register(Hook::after_remove(|_| Err(PocketError::from("boom"))));
        let counter = calls.clone();
        registry.register(Hook::after_remove(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        registry.after_remove(&doc! {});
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_update_rewrites_criteria_and_data() {
        let registry = HookRegistry::new();
        registry.register(Hook::before_update(|criteria, data| {
            *criteria = field("name").eq("Bob");
            data.put("touched", true);
            Ok(())
        }));

        let mut criteria = Criteria::new();
        let mut data = doc! { "age": 30 };
        registry.before_update(&mut criteria, &mut data).unwrap();
        assert!(criteria.matches(&doc! { "name": "Bob" }));
        assert_eq!(data, doc! { "age": 30, "touched": true });
    }

    #[test]
    fn test_remove_veto_and_errors() {
        let registry = HookRegistry::new();
        registry.register(Hook::before_remove(|_| Err(PocketError::from("ignored"))));
        assert!(registry.allows_remove(&doc! { "keep": false }));

        registry.register(Hook::before_remove(|doc| {
            Ok(if doc.get("keep") == Some(&Value::Bool(true)) {
                HookOutcome::Veto
            } else {
                HookOutcome::Continue
            })
        }));
        assert!(!registry.allows_remove(&doc! { "keep": true }));
        assert!(registry.allows_remove(&doc! { "keep": false }));
    }

    #[test]
    fn test_unregister_one_or_all() {
        let registry = HookRegistry::new();
        let first = registry.register(Hook::before_insert(|_| Ok(HookOutcome::Veto)));
        registry.register(Hook::before_insert(|_| Ok(HookOutcome::Continue)));
        registry.register(Hook::after_insert(|_, _| Ok(())));

        assert_eq!(registry.unregister(HookEvent::BeforeInsert, Some(first)), 1);
        assert!(registry.before_insert(doc! {}).unwrap().is_some());

        assert_eq!(registry.unregister(HookEvent::BeforeInsert, None), 1);
        assert_eq!(registry.unregister(HookEvent::AfterInsert, None), 1);
        assert_eq!(registry.unregister(HookEvent::AfterInsert, None), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(HookEvent::BeforeInsert.to_string(), "beforeInsert");
        assert_eq!(HookEvent::AfterRemove.to_string(), "afterRemove");
    }
}
