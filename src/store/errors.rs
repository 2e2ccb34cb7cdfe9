//! Store error types
//!
//! Every store error is operational from the caller's point of view: the
//! HTTP layer logs it and answers with a generic message.

use thiserror::Error;

/// Result type for document store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The handle was used before a store was connected
    #[error("Document store is not connected")]
    NotConnected,

    /// Filter document could not be parsed
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Update document could not be parsed or applied
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// Projection mixes inclusion and exclusion, or has bad values
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    /// Index definition or options rejected
    #[error("Invalid index: {0}")]
    InvalidIndex(String),

    /// Document shape rejected on insert
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Unique index violation
    #[error("Duplicate key on index '{index}': {key}")]
    DuplicateKey { index: String, key: String },

    /// Update attempted to modify an immutable field
    #[error("Performing an update on the path '{0}' would modify the immutable field")]
    ImmutableField(String),

    /// Anything else that went wrong inside the store
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Short stable code for log lines
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotConnected => "STORE_NOT_CONNECTED",
            StoreError::InvalidQuery(_) => "STORE_INVALID_QUERY",
            StoreError::InvalidUpdate(_) => "STORE_INVALID_UPDATE",
            StoreError::InvalidProjection(_) => "STORE_INVALID_PROJECTION",
            StoreError::InvalidIndex(_) => "STORE_INVALID_INDEX",
            StoreError::InvalidDocument(_) => "STORE_INVALID_DOCUMENT",
            StoreError::DuplicateKey { .. } => "STORE_DUPLICATE_KEY",
            StoreError::ImmutableField(_) => "STORE_IMMUTABLE_FIELD",
            StoreError::Internal(_) => "STORE_INTERNAL",
        }
    }
}
