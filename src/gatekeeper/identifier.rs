//! `_id` normalization
//!
//! Clients send object identifiers as plain hex strings. Before a filter
//! reaches the store, a string `_id` is replaced by its typed form
//! `{"$oid": "<hex>"}`. A string that is not a valid identifier fails the
//! operation before anything is planned or executed.

use serde_json::Value;
use thiserror::Error;

use crate::store::{Document, DocumentId, ID_FIELD};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid _id '{raw}': expected a 24-character hexadecimal identifier")]
pub struct InvalidIdError {
    pub raw: String,
}

/// Parses the canonical identifier encoding
pub fn normalize_id(raw: &str) -> Result<DocumentId, InvalidIdError> {
    DocumentId::parse(raw).map_err(|_| InvalidIdError {
        raw: raw.to_string(),
    })
}

/// Replaces a plain-string `_id` in a filter with its typed form.
///
/// Any other `_id` value (number, operator object, typed literal) is left
/// untouched.
pub fn normalize_filter_id(filter: &mut Document) -> Result<(), InvalidIdError> {
    if let Some(Value::String(raw)) = filter.get(ID_FIELD) {
        let id = normalize_id(raw)?;
        filter.insert(ID_FIELD.to_string(), id.to_value());
    }
    Ok(())
}
