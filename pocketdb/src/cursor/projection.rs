use crate::common::{is_truthy, Document, DOC_ID};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use indexmap::IndexMap;
use serde_json::Value;

/// Selects the top level fields returned by a cursor.
///
/// When any field is included only included fields are kept, together with
/// `_id` unless it was excluded, in the order of the document. Otherwise the
/// excluded fields are removed and everything else is kept.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::cursor::Projection;
///
/// let names = users.find(all())?
///     .project(Projection::new().include("name"))
///     .to_array()?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    rules: IndexMap<String, bool>,
}

impl Projection {
    pub fn new() -> Self {
        Projection::default()
    }

    pub fn include(mut self, field: &str) -> Self {
        self.rules.insert(field.to_string(), true);
        self
    }

    pub fn exclude(mut self, field: &str) -> Self {
        self.rules.insert(field.to_string(), false);
        self
    }

    /// Parses `{"name": 1, "_id": 0}` style maps. Truthy values include,
    /// falsy values exclude.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if `value` is not an object.
    pub fn from_json(value: &Value) -> PocketResult<Self> {
        let Value::Object(map) = value else {
            log::error!("Projection must be a JSON object, found {}", value);
            return Err(PocketError::new(
                "Projection must be a JSON object",
                ErrorKind::InvalidOperation,
            ));
        };
        Ok(Projection {
            rules: map
                .iter()
                .map(|(field, flag)| (field.clone(), is_truthy(flag)))
                .collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, document: Document) -> Document {
        if self.rules.is_empty() {
            return document;
        }

        if !self.rules.values().any(|included| *included) {
            let mut document = document;
            for (field, _) in self.rules.iter() {
                document.remove(field);
            }
            return document;
        }

        let mut projected = Document::new();
        for (field, value) in document {
            let keep = match self.rules.get(&field) {
                Some(included) => *included,
                None => field == DOC_ID,
            };
            if keep {
                projected.put(&field, value);
            }
        }
        projected
    }
}
