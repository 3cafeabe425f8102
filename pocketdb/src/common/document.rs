use crate::common::{resolve_path, DOC_ID};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// A JSON-shaped record stored in a collection.
///
/// A `Document` is an ordered map of string keys to JSON values. Key order is
/// preserved through encoding and decoding. Every document stored in a
/// collection carries an identifier under the `_id` key.
///
/// # Examples
///
/// ```rust,ignore
/// use pocketdb::doc;
///
/// let mut doc = doc!{ "name": "Alice", "address": { "city": "Boston" } };
/// doc.put("age", 25);
/// assert_eq!(doc.get_path("address.city"), Some(&"Boston".into()));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    data: Map<String, Value>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Document { data: Map::new() }
    }

    /// Creates a document from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `EncodingError` if the value is not a JSON object.
    pub fn from_value(value: Value) -> PocketResult<Self> {
        match value {
            Value::Object(data) => Ok(Document { data }),
            other => {
                log::error!("Expected a JSON object for a document, found {}", other);
                Err(PocketError::new(
                    "A document must be a JSON object",
                    ErrorKind::EncodingError,
                ))
            }
        }
    }

    /// Parses a document from its JSON text.
    pub fn from_json(json: &str) -> PocketResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Document::from_value(value)
    }

    #[doc(hidden)]
    pub fn from_object(value: Value) -> Self {
        match value {
            Value::Object(data) => Document { data },
            _ => Document::new(),
        }
    }

    /// Returns the top level value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns the value at a dot separated path such as `address.city`.
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        match self.data.get(path) {
            Some(value) => Some(value),
            None => resolve_path(&self.data, path),
        }
    }

    /// Stores a value under a top level key, returning the previous value.
    pub fn put<V: Into<Value>>(&mut self, key: &str, value: V) -> Option<Value> {
        self.data.insert(key.to_string(), value.into())
    }

    /// Removes a top level key, keeping the order of the remaining keys.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the document identifier, if present and not null.
    pub fn id(&self) -> Option<&Value> {
        match self.data.get(DOC_ID) {
            Some(Value::Null) | None => None,
            Some(id) => Some(id),
        }
    }

    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }

    pub fn set_id<V: Into<Value>>(&mut self, id: V) {
        self.data.insert(DOC_ID.to_string(), id.into());
    }

    /// Overlays the top level keys of `other` onto this document.
    pub fn merge(&mut self, other: &Document) {
        for (key, value) in other.data.iter() {
            self.data.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.data) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self.data),
        }
    }
}

impl From<Map<String, Value>> for Document {
    fn from(data: Map<String, Value>) -> Self {
        Document { data }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        doc.into_value()
    }
}

impl TryFrom<Value> for Document {
    type Error = PocketError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Document::from_value(value)
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// Creates a [`Document`] from a JSON object literal.
///
/// ```rust,ignore
/// use pocketdb::doc;
///
/// let doc = doc!{ "name": "Bob", "tags": ["a", "b"], "age": 30 };
/// ```
#[macro_export]
macro_rules! doc {
    () => {
        $crate::common::Document::new()
    };
    ($($tt:tt)+) => {
        $crate::common::Document::from_object($crate::serde_json::json!({ $($tt)+ }))
    };
}
