//! Storage encoding for documents.
//!
//! Documents are stored as JSON text. When an encryption key is configured the
//! identifier stays readable and the rest of the document is sealed with
//! AES-256-CBC under a key derived from the passphrase with SHA-256.

mod cipher;
mod document_codec;

pub(crate) use cipher::*;
pub use document_codec::*;
