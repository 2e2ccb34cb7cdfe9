//! Document store
//!
//! The gateway talks to its backing database through the `DocumentStore`
//! trait. `MemoryStore` is the in-process implementation: implicit
//! collections, declared B-tree indexes, a rule-based planner and
//! explain output in the usual `queryPlanner` / `executionStats` layout.
//!
//! Nothing here is durable. Data lives for the life of the process.

mod config;
mod document;
mod errors;
mod handle;
mod index;
mod matcher;
mod memory;
mod plan;
mod planner;
mod projection;
mod query;
mod sorter;
mod update;
mod value;

use serde::Serialize;
use serde_json::Value;

pub use config::{IndexDeclaration, SeedSource, StoreConfig};
pub use document::{
    is_extended_literal, validate_collection_name, Document, DocumentId, ID_FIELD, OID_KEY,
};
pub use errors::{StoreError, StoreResult};
pub use handle::StoreHandle;
pub use index::{IndexOptions, IndexSpec, ID_INDEX_NAME};
pub use memory::MemoryStore;
pub use plan::PlanStage;
pub use query::{
    AggregationQuery, Explainable, FindModifiers, LogicalQuery, Stage, StageKind, Verbosity,
};

/// Result of an update call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    pub acknowledged: bool,
}

/// Result of a delete call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_count: u64,
}

/// Result of a bulk insert
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertOutcome {
    pub inserted_ids: Vec<Value>,
}

/// Operations the gateway needs from a document database.
///
/// Collections are created implicitly by writes and index declarations.
/// Reads against a missing collection return nothing.
pub trait DocumentStore: Send + Sync {
    /// Database name, used for explain namespaces
    fn database(&self) -> &str;

    /// Run a find with its modifiers applied
    fn find(&self, query: &LogicalQuery) -> StoreResult<Vec<Document>>;

    /// Number of documents matching a filter
    fn count(&self, collection: &str, filter: &Document) -> StoreResult<u64>;

    /// Produce the execution plan for a find or an aggregation
    fn explain(&self, target: Explainable<'_>, verbosity: Verbosity) -> StoreResult<Value>;

    /// Run an aggregation pipeline
    fn aggregate(&self, query: &AggregationQuery) -> StoreResult<Vec<Document>>;

    /// Insert one document, returning its `_id`
    fn insert_one(&self, collection: &str, document: Document) -> StoreResult<Value>;

    /// Insert a batch. Either every document is stored or none is.
    fn insert_many(&self, collection: &str, documents: Vec<Document>) -> StoreResult<InsertOutcome>;

    /// Apply an operator update to the first matching document
    fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome>;

    /// Apply an operator update to every matching document
    fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Document,
    ) -> StoreResult<UpdateOutcome>;

    fn delete_one(&self, collection: &str, filter: &Document) -> StoreResult<DeleteOutcome>;

    fn delete_many(&self, collection: &str, filter: &Document) -> StoreResult<DeleteOutcome>;

    /// Declare an index, returning its name. Re-declaring an identical
    /// index is a no-op.
    fn create_index(
        &self,
        collection: &str,
        keys: &Document,
        options: IndexOptions,
    ) -> StoreResult<String>;

    /// Indexes on a collection, `_id_` first
    fn list_indexes(&self, collection: &str) -> StoreResult<Vec<IndexSpec>>;
}
