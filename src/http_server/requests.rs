//! Request bodies
//!
//! Shape errors (wrong JSON types, unknown array operations, unknown index
//! options) are caught by deserialization. Presence and emptiness rules
//! are checked by the helpers below so they produce specific messages.

use serde::Deserialize;
use serde_json::Value;

use super::errors::{ApiError, ApiResult};
use crate::store::{validate_collection_name, Document, IndexOptions};

fn default_limit() -> u64 {
    10
}

/// Body of `/filter`
#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Document,
}

/// Body of `/projection`
#[derive(Debug, Deserialize)]
pub struct ProjectionRequest {
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Document,
    #[serde(default)]
    pub projection: Document,
}

/// Body of `/sort`
#[derive(Debug, Deserialize)]
pub struct SortRequest {
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Document,
    #[serde(default)]
    pub sort: Document,
}

/// Body of `/skip`
#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Document,
    #[serde(default)]
    pub skip: u64,
}

/// Body of `/limit`
#[derive(Debug, Deserialize)]
pub struct LimitRequest {
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Document,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

/// Body of `/aggregate`. Every stage input is optional.
#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub collection: Option<String>,
    #[serde(rename = "match")]
    pub filter: Option<Document>,
    pub project: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOneRequest {
    pub collection: Option<String>,
    pub data: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub struct CreateManyRequest {
    pub collection: Option<String>,
    pub documents: Option<Vec<Document>>,
}

/// Body of `/update/oneDocument` and `/update/manyDocuments`
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub collection: Option<String>,
    pub filter: Option<Document>,
    pub update: Option<Document>,
}

/// Array modification applied by `/update/array`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArrayOperation {
    #[default]
    Push,
    AddToSet,
    Pull,
}

impl ArrayOperation {
    pub fn operator(&self) -> &'static str {
        match self {
            ArrayOperation::Push => "$push",
            ArrayOperation::AddToSet => "$addToSet",
            ArrayOperation::Pull => "$pull",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayUpdateRequest {
    pub collection: Option<String>,
    pub filter: Option<Document>,
    pub array_field: Option<String>,
    /// A JSON `null` counts as missing
    pub value: Option<Value>,
    #[serde(default)]
    pub operation: ArrayOperation,
}

impl ArrayUpdateRequest {
    /// `{"<operator>": {"<arrayField>": value}}`
    pub fn update_document(field: &str, operation: ArrayOperation, value: Value) -> Document {
        let mut inner = Document::new();
        inner.insert(field.to_string(), value);
        let mut update = Document::new();
        update.insert(operation.operator().to_string(), Value::Object(inner));
        update
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub collection: Option<String>,
    pub filter: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub struct SimpleIndexRequest {
    pub collection: Option<String>,
    pub field: Option<String>,
    #[serde(default)]
    pub options: IndexOptions,
}

#[derive(Debug, Deserialize)]
pub struct CompoundIndexRequest {
    pub collection: Option<String>,
    /// Ordered `{field: direction}` map
    pub fields: Option<Document>,
    #[serde(default)]
    pub options: IndexOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultikeyIndexRequest {
    pub collection: Option<String>,
    pub array_field: Option<String>,
    #[serde(default)]
    pub options: IndexOptions,
}

/// A present, valid collection name
pub fn require_collection(collection: Option<String>) -> ApiResult<String> {
    let name = collection.ok_or_else(|| ApiError::MissingParam("collection".into()))?;
    validate_collection_name(&name).map_err(ApiError::InvalidParam)?;
    Ok(name)
}

/// A present, non-empty string field
pub fn require_field(name: &str, value: Option<String>) -> ApiResult<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(ApiError::InvalidParam(format!("{} must not be empty", name))),
        None => Err(ApiError::MissingParam(name.into())),
    }
}

/// A present object, possibly empty
pub fn require_document(name: &str, value: Option<Document>) -> ApiResult<Document> {
    value.ok_or_else(|| ApiError::MissingParam(name.into()))
}

/// A present, non-empty object
pub fn require_non_empty(name: &str, value: Option<Document>) -> ApiResult<Document> {
    let document = require_document(name, value)?;
    non_empty(name, document)
}

pub fn non_empty(name: &str, document: Document) -> ApiResult<Document> {
    if document.is_empty() {
        return Err(ApiError::InvalidParam(format!(
            "{} must specify at least one field",
            name
        )));
    }
    Ok(document)
}
