use crate::codec::{derive_key, open, seal};
use crate::common::{Document, DOC_ID, ENCRYPTED_DATA, ENCRYPTED_IV};
use crate::errors::{ErrorKind, PocketError, PocketResult};
use serde_json::{Map, Value};
use std::fmt::{Debug, Formatter};

/// Encodes documents into their stored JSON form and back.
///
/// In plain mode the stored form is the document itself. In encrypted mode it
/// is a wrapper object:
///
/// ```json
/// {"_id": "<id or null>", "encrypted_data": "<base64>", "iv": "<base64>"}
/// ```
///
/// Decoding is lenient: a row that cannot be parsed or opened decodes to
/// `None` so that a scan can skip it. Encoding failures are errors.
#[derive(Clone, Default)]
pub struct DocumentCodec {
    key: Option<[u8; 32]>,
}

impl DocumentCodec {
    /// Creates a codec for an optional passphrase. An empty passphrase selects
    /// plain mode.
    pub fn new(passphrase: Option<&str>) -> Self {
        DocumentCodec {
            key: passphrase.filter(|p| !p.is_empty()).map(derive_key),
        }
    }

    pub fn plain() -> Self {
        DocumentCodec { key: None }
    }

    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    /// Encodes a document for storage.
    ///
    /// # Errors
    ///
    /// * `EncodingError` if the document cannot be serialized
    /// * `SecurityError` if the payload cannot be encrypted
    pub fn encode(&self, document: &Document) -> PocketResult<String> {
        match &self.key {
            None => to_json(document.as_map()),
            Some(key) => {
                let mut payload = document.as_map().clone();
                let id = match document.id() {
                    Some(id) => {
                        let id = id.clone();
                        payload.shift_remove(DOC_ID);
                        id
                    }
                    None => Value::Null,
                };

                let plain = to_json(&payload)?;
                let sealed = seal(plain.as_bytes(), key)?;

                let mut wrapper = Map::new();
                wrapper.insert(DOC_ID.to_string(), id);
                wrapper.insert(ENCRYPTED_DATA.to_string(), Value::String(sealed.data));
                wrapper.insert(ENCRYPTED_IV.to_string(), Value::String(sealed.iv));
                to_json(&wrapper)
            }
        }
    }

    /// Decodes a stored row. Returns `None` for corrupt rows, for encrypted
    /// rows when no key is configured and for rows sealed with another key.
    pub fn decode(&self, stored: &str) -> Option<Document> {
        let decoded = match serde_json::from_str::<Value>(stored) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return None,
            Err(e) => {
                log::debug!("Skipping undecodable document: {}", e);
                return None;
            }
        };

        if !is_encrypted_wrapper(&decoded) {
            return Some(Document::from(decoded));
        }

        let key = self.key.as_ref()?;
        let data = decoded.get(ENCRYPTED_DATA).and_then(Value::as_str)?;
        let iv = decoded.get(ENCRYPTED_IV).and_then(Value::as_str).unwrap_or("");
        let plain = open(data, iv, key)?;

        let mut payload = match serde_json::from_slice::<Value>(&plain) {
            Ok(Value::Object(map)) => map,
            _ => return None,
        };

        match decoded.get(DOC_ID) {
            Some(Value::Null) | None => {}
            Some(id) => {
                payload.insert(DOC_ID.to_string(), id.clone());
            }
        }
        Some(Document::from(payload))
    }
}

impl Debug for DocumentCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentCodec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

fn is_encrypted_wrapper(map: &Map<String, Value>) -> bool {
    matches!(map.get(ENCRYPTED_DATA), Some(v) if !v.is_null())
}

fn to_json(map: &Map<String, Value>) -> PocketResult<String> {
    serde_json::to_string(map).map_err(|e| {
        log::error!("Failed to encode document: {}", e);
        PocketError::new(&format!("JSON encode error: {}", e), ErrorKind::EncodingError)
    })
}
