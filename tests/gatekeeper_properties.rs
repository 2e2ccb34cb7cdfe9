//! Gatekeeper Property Tests
//!
//! Tests for the authorization routine against a scripted store:
//! - Empty filters skip explain for every operation but the plain filter
//! - A scan at the root or one level down is rejected
//! - A scan two levels down is not detected
//! - Invalid identifiers never reach the store
//! - Plan retrieval failures are errors, not rejections

use std::sync::atomic::{AtomicUsize, Ordering};

use indexgate::gatekeeper::{
    assemble, authorize, normalize_filter_id, Gatekeeper, Operation, Verdict,
};
use indexgate::store::{
    AggregationQuery, DeleteOutcome, Document, DocumentStore, Explainable, IndexOptions,
    IndexSpec, InsertOutcome, LogicalQuery, StageKind, StoreError, StoreResult, UpdateOutcome,
    Verbosity,
};
use serde_json::{json, Value};

// =============================================================================
// Scripted Store
// =============================================================================

/// Answers explain with a fixed document. Everything else is unreachable
/// from the gatekeeper and panics.
struct ScriptedStore {
    plan: Result<Value, StoreError>,
    explain_calls: AtomicUsize,
    forbid_explain: bool,
}

impl ScriptedStore {
    fn find_plan(root: Value) -> Self {
        Self {
            plan: Ok(json!({"executionStats": {"executionStages": root}})),
            explain_calls: AtomicUsize::new(0),
            forbid_explain: false,
        }
    }

    fn raw(plan: Value) -> Self {
        Self {
            plan: Ok(plan),
            explain_calls: AtomicUsize::new(0),
            forbid_explain: false,
        }
    }

    fn failing(err: StoreError) -> Self {
        Self {
            plan: Err(err),
            explain_calls: AtomicUsize::new(0),
            forbid_explain: false,
        }
    }

    fn forbidding() -> Self {
        Self {
            forbid_explain: true,
            ..Self::find_plan(json!({"stage": "COLLSCAN"}))
        }
    }

    fn calls(&self) -> usize {
        self.explain_calls.load(Ordering::SeqCst)
    }
}

impl DocumentStore for ScriptedStore {
    fn database(&self) -> &str {
        "scripted"
    }

    fn find(&self, _query: &LogicalQuery) -> StoreResult<Vec<Document>> {
        panic!("gatekeeper must not execute queries")
    }

    fn count(&self, _collection: &str, _filter: &Document) -> StoreResult<u64> {
        panic!("gatekeeper must not count")
    }

    fn explain(&self, _target: Explainable<'_>, verbosity: Verbosity) -> StoreResult<Value> {
        assert!(!self.forbid_explain, "explain called for a skipped check");
        assert_eq!(verbosity, Verbosity::ExecutionStats);
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        self.plan.clone()
    }

    fn aggregate(&self, _query: &AggregationQuery) -> StoreResult<Vec<Document>> {
        panic!("gatekeeper must not aggregate")
    }

    fn insert_one(&self, _collection: &str, _document: Document) -> StoreResult<Value> {
        panic!("gatekeeper must not write")
    }

    fn insert_many(&self, _collection: &str, _documents: Vec<Document>) -> StoreResult<InsertOutcome> {
        panic!("gatekeeper must not write")
    }

    fn update_one(&self, _c: &str, _f: &Document, _u: &Document) -> StoreResult<UpdateOutcome> {
        panic!("gatekeeper must not write")
    }

    fn update_many(&self, _c: &str, _f: &Document, _u: &Document) -> StoreResult<UpdateOutcome> {
        panic!("gatekeeper must not write")
    }

    fn delete_one(&self, _collection: &str, _filter: &Document) -> StoreResult<DeleteOutcome> {
        panic!("gatekeeper must not write")
    }

    fn delete_many(&self, _collection: &str, _filter: &Document) -> StoreResult<DeleteOutcome> {
        panic!("gatekeeper must not write")
    }

    fn create_index(&self, _c: &str, _k: &Document, _o: IndexOptions) -> StoreResult<String> {
        panic!("gatekeeper must not write")
    }

    fn list_indexes(&self, _collection: &str) -> StoreResult<Vec<IndexSpec>> {
        panic!("gatekeeper must not list indexes")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn find(filter: Value) -> LogicalQuery {
    LogicalQuery::new("resenas", doc(filter))
}

const SKIPPING: [Operation; 8] = [
    Operation::Projection,
    Operation::Sort,
    Operation::Skip,
    Operation::Limit,
    Operation::UpdateOne,
    Operation::UpdateMany,
    Operation::ArrayUpdate,
    Operation::Aggregate,
];

// =============================================================================
// Empty Filter Tests
// =============================================================================

/// Empty filters are allowed without a plan.
#[test]
fn test_empty_filter_never_explains() {
    let store = ScriptedStore::forbidding();
    let query = find(json!({}));
    for op in SKIPPING {
        let verdict = authorize(&store, op, Explainable::Find(&query)).unwrap();
        assert_eq!(verdict, Verdict::allow(), "{}", op);
    }
}

/// A pipeline without a match stage is allowed without a plan.
#[test]
fn test_pipeline_without_match_never_explains() {
    let store = ScriptedStore::forbidding();
    let pipeline = assemble("resenas", None, None, Some(doc(json!({"rating": -1}))), None, Some(5));
    let verdict = authorize(&store, Operation::Aggregate, Explainable::Aggregate(&pipeline)).unwrap();
    assert!(verdict.allowed);
}

/// The plain filter read always explains.
#[test]
fn test_empty_filter_on_filter_operation_is_checked() {
    let store = ScriptedStore::find_plan(json!({"stage": "COLLSCAN"}));
    let query = find(json!({}));
    let verdict = authorize(&store, Operation::Filter, Explainable::Find(&query)).unwrap();
    assert!(!verdict.allowed);
    assert_eq!(store.calls(), 1);
}

// =============================================================================
// Classification Tests
// =============================================================================

/// Root scan is rejected for every operation.
#[test]
fn test_root_scan_rejected() {
    let query = find(json!({"estado": "Pendiente"}));
    for op in Operation::ALL {
        let store = ScriptedStore::find_plan(json!({"stage": "COLLSCAN"}));
        let verdict = authorize(&store, op, Explainable::Find(&query)).unwrap();
        assert!(!verdict.allowed, "{}", op);
        assert_eq!(verdict.reason.as_deref(), Some(op.rejection_message()));
        assert_eq!(store.calls(), 1);
    }
}

/// A scan wrapped once is rejected.
#[test]
fn test_single_wrapped_scan_rejected() {
    for wrapper in ["SORT", "LIMIT", "SKIP", "PROJECTION_SIMPLE", "FETCH"] {
        let store = ScriptedStore::find_plan(json!({
            "stage": wrapper,
            "inputStage": {"stage": "COLLSCAN", "filter": {"estado": {"$eq": "x"}}}
        }));
        let query = find(json!({"estado": "x"}));
        let verdict = authorize(&store, Operation::Sort, Explainable::Find(&query)).unwrap();
        assert!(!verdict.allowed, "{}", wrapper);
    }
}

/// A scan two levels down passes.
#[test]
fn test_double_wrapped_scan_not_detected() {
    let store = ScriptedStore::find_plan(json!({
        "stage": "PROJECTION_SIMPLE",
        "inputStage": {
            "stage": "LIMIT",
            "inputStage": {"stage": "COLLSCAN"}
        }
    }));
    let query = find(json!({"estado": "x"}));
    let verdict = authorize(&store, Operation::Projection, Explainable::Find(&query)).unwrap();
    assert!(verdict.allowed);
}

/// Index plans pass.
#[test]
fn test_index_plans_allowed() {
    for root in [
        json!({"stage": "FETCH", "inputStage": {"stage": "IXSCAN"}}),
        json!({"stage": "IDHACK"}),
        json!({"stage": "EOF"}),
        json!({"stage": "SORT", "inputStage": {"stage": "FETCH", "inputStage": {"stage": "IXSCAN"}}}),
    ] {
        let store = ScriptedStore::find_plan(root);
        let query = find(json!({"rating": 5}));
        let verdict = authorize(&store, Operation::Filter, Explainable::Find(&query)).unwrap();
        assert!(verdict.allowed);
    }
}

/// A plan with no reachable root counts as no scan.
#[test]
fn test_unreachable_root_allowed() {
    let store = ScriptedStore::raw(json!({"queryPlanner": {"winningPlan": {"stage": "COLLSCAN"}}}));
    let query = find(json!({"estado": "x"}));
    let verdict = authorize(&store, Operation::Filter, Explainable::Find(&query)).unwrap();
    assert!(verdict.allowed);
}

// =============================================================================
// Aggregation Tests
// =============================================================================

/// The cursor stage of an aggregation explain is inspected.
#[test]
fn test_aggregation_cursor_path() {
    let store = ScriptedStore::raw(json!({
        "stages": [
            {"$cursor": {"executionStats": {"executionStages": {"stage": "COLLSCAN"}}}},
            {"$sort": {"rating": -1}}
        ]
    }));
    let pipeline = assemble("resenas", Some(doc(json!({"estado": "x"}))), None, None, None, None);
    let verdict = authorize(&store, Operation::Aggregate, Explainable::Aggregate(&pipeline)).unwrap();
    assert!(!verdict.allowed);
}

/// Stores that name the first stage `cursorStage` are read the same way.
#[test]
fn test_aggregation_cursor_stage_path() {
    let store = ScriptedStore::raw(json!({
        "stages": [
            {"cursorStage": {"executionStats": {"executionStages": {"stage": "COLLSCAN"}}}}
        ]
    }));
    let pipeline = assemble("resenas", Some(doc(json!({"estado": "x"}))), None, None, None, None);
    let verdict = authorize(&store, Operation::Aggregate, Explainable::Aggregate(&pipeline)).unwrap();
    assert!(!verdict.allowed);
    assert_eq!(
        verdict.reason.as_deref(),
        Some(Operation::Aggregate.rejection_message())
    );

    let store = ScriptedStore::raw(json!({
        "stages": [
            {"cursorStage": {"executionStats": {"executionStages": {
                "stage": "FETCH", "inputStage": {"stage": "IXSCAN"}
            }}}}
        ]
    }));
    let verdict = authorize(&store, Operation::Aggregate, Explainable::Aggregate(&pipeline)).unwrap();
    assert!(verdict.allowed);
}

/// Without `stages`, the aggregation explain is read like a find.
#[test]
fn test_aggregation_find_fallback() {
    let store = ScriptedStore::find_plan(json!({"stage": "COLLSCAN"}));
    let pipeline = assemble("resenas", Some(doc(json!({"estado": "x"}))), None, None, None, None);
    let verdict = authorize(&store, Operation::Aggregate, Explainable::Aggregate(&pipeline)).unwrap();
    assert!(!verdict.allowed);
}

/// Stage order for a sparse request.
#[test]
fn test_assemble_order() {
    let pipeline = assemble(
        "ordenes",
        Some(doc(json!({"status": "open"}))),
        None,
        Some(doc(json!({"date": -1}))),
        Some(0),
        Some(5),
    );
    assert_eq!(
        pipeline.kinds(),
        vec![StageKind::Match, StageKind::Sort, StageKind::Limit]
    );
}

// =============================================================================
// Identifier Tests
// =============================================================================

/// A valid identifier is typed before planning.
#[test]
fn test_valid_id_normalized() {
    let mut filter = doc(json!({"_id": "507f1f77bcf86cd799439011"}));
    normalize_filter_id(&mut filter).unwrap();
    assert_eq!(filter["_id"], json!({"$oid": "507f1f77bcf86cd799439011"}));
}

/// An invalid identifier fails before the store is touched.
#[test]
fn test_invalid_id_never_reaches_store() {
    let store = ScriptedStore::forbidding();
    let gate = Gatekeeper::default();

    for op in [Operation::UpdateOne, Operation::UpdateMany, Operation::ArrayUpdate] {
        let err = gate
            .check_update(&store, op, "resenas", doc(json!({"_id": "not-an-id"})))
            .unwrap_err();
        assert!(err.is_input_error());
    }

    let err = gate
        .check_aggregation(&store, "resenas", Some(doc(json!({"_id": "not-an-id"}))))
        .unwrap_err();
    assert!(err.is_input_error());
    assert_eq!(store.calls(), 0);
}

// =============================================================================
// Failure Tests
// =============================================================================

/// Plan retrieval failure is an error, not a rejection.
#[test]
fn test_explain_failure_is_operational() {
    let store = ScriptedStore::failing(StoreError::NotConnected);
    let query = find(json!({"estado": "x"}));
    let err = authorize(&store, Operation::Filter, Explainable::Find(&query)).unwrap_err();
    assert_eq!(err, StoreError::NotConnected);

    let gate = Gatekeeper::default();
    assert!(gate.check(&store, Operation::Filter, Explainable::Find(&query)).is_err());
    assert_eq!(gate.metrics().snapshot().gate_rejected, 0);
}

/// Verdicts are recomputed on every call.
#[test]
fn test_no_plan_caching() {
    let store = ScriptedStore::find_plan(json!({"stage": "IXSCAN"}));
    let gate = Gatekeeper::default();
    let query = find(json!({"rating": 5}));
    for _ in 0..3 {
        gate.check(&store, Operation::Filter, Explainable::Find(&query)).unwrap();
    }
    assert_eq!(store.calls(), 3);
}
