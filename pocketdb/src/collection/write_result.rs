use serde_json::Value;

/// The outcome of an insert or save.
///
/// A veto from a before-insert hook is not an error, so it is reported here
/// rather than through `Err`.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::doc;
///
/// let result = users.insert(doc!{ "name": "Alice" })?;
/// if let Some(id) = result.id() {
///     println!("Inserted document with ID: {}", id);
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum WriteResult {
    /// The document was stored under this identifier.
    Written(Value),
    /// A hook vetoed the write. Nothing was stored.
    Vetoed,
}

impl WriteResult {
    /// The identifier of the stored document, `None` if vetoed.
    pub fn id(&self) -> Option<&Value> {
        match self {
            WriteResult::Written(id) => Some(id),
            WriteResult::Vetoed => None,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written(_))
    }

    pub fn is_vetoed(&self) -> bool {
        matches!(self, WriteResult::Vetoed)
    }
}

/// The outcome of a batch insert.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchResult {
    /// Every document was stored, with these identifiers in input order.
    Written(Vec<Value>),
    /// The document at this input position was vetoed and the whole batch
    /// was rolled back.
    Vetoed(usize),
}

impl BatchResult {
    /// Number of documents stored, zero for a vetoed batch.
    pub fn count(&self) -> usize {
        match self {
            BatchResult::Written(ids) => ids.len(),
            BatchResult::Vetoed(_) => 0,
        }
    }

    pub fn ids(&self) -> &[Value] {
        match self {
            BatchResult::Written(ids) => ids,
            BatchResult::Vetoed(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_result_accessors() {
        let written = WriteResult::Written(Value::from("u1"));
        assert_eq!(written.id(), Some(&Value::from("u1")));
        assert!(written.is_written());

        let vetoed = WriteResult::Vetoed;
        assert_eq!(vetoed.id(), None);
        assert!(vetoed.is_vetoed());
    }

    #[test]
    fn test_batch_result_count() {
        let written = BatchResult::Written(vec![Value::from(1), Value::from(2)]);
        assert_eq!(written.count(), 2);
        assert_eq!(written.ids().len(), 2);
        assert_eq!(BatchResult::Vetoed(1).count(), 0);
        assert!(BatchResult::Vetoed(1).ids().is_empty());
    }
}
