//! Memory Store Planner Tests
//!
//! Tests for the plans the in-memory store reports:
//! - Access path selection (IDHACK, IXSCAN, OR, COLLSCAN, EOF)
//! - Modifier stages wrapping the access stage
//! - Execution counters
//! - Aggregation explain layout

use indexgate::gatekeeper::is_full_scan_value;
use indexgate::store::{
    AggregationQuery, Document, DocumentStore, Explainable, IndexOptions, LogicalQuery,
    MemoryStore, Stage, Verbosity,
};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn ordenes() -> MemoryStore {
    let store = MemoryStore::new("Proyecto2");
    let documents = (0..20)
        .map(|i| {
            doc(json!({
                "id_usuario": i % 5,
                "estado": if i % 2 == 0 { "Pendiente" } else { "Entregado" },
                "total": i * 10,
                "items": [format!("item{}", i % 3), "bebida"]
            }))
        })
        .collect();
    store.insert_many("ordenes", documents).unwrap();
    store
        .create_index(
            "ordenes",
            &doc(json!({"id_usuario": 1, "estado": 1})),
            IndexOptions::default(),
        )
        .unwrap();
    store
        .create_index("ordenes", &doc(json!({"items": 1})), IndexOptions::default())
        .unwrap();
    store
}

fn explain(store: &MemoryStore, query: &LogicalQuery) -> Value {
    store
        .explain(Explainable::Find(query), Verbosity::ExecutionStats)
        .unwrap()
}

fn root(explain: &Value) -> &Value {
    &explain["executionStats"]["executionStages"]
}

fn stage_chain(explain: &Value) -> Vec<String> {
    let mut chain = Vec::new();
    let mut node = Some(root(explain));
    while let Some(stage) = node.filter(|s| s.is_object()) {
        chain.push(stage["stage"].as_str().unwrap().to_string());
        node = stage.get("inputStage");
    }
    chain
}

// =============================================================================
// Access Path Tests
// =============================================================================

/// Compound prefix equality uses the compound index.
#[test]
fn test_compound_prefix_uses_index() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"id_usuario": 3, "estado": "Entregado"})));
    let plan = explain(&store, &query);

    assert_eq!(stage_chain(&plan), vec!["FETCH", "IXSCAN"]);
    assert_eq!(root(&plan)["inputStage"]["indexName"], json!("id_usuario_1_estado_1"));
    assert_eq!(plan["executionStats"]["nReturned"], json!(2));
    assert!(!is_full_scan_value(root(&plan)));
}

/// A non-leading compound field cannot use the index.
#[test]
fn test_non_prefix_field_scans() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"estado": "Entregado"})));
    let plan = explain(&store, &query);

    assert_eq!(stage_chain(&plan), vec!["COLLSCAN"]);
    assert_eq!(plan["executionStats"]["totalDocsExamined"], json!(20));
    assert_eq!(plan["executionStats"]["nReturned"], json!(10));
    assert!(is_full_scan_value(root(&plan)));
}

/// Array fields are indexed per element.
#[test]
fn test_multikey_lookup() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"items": "item1"})));
    let plan = explain(&store, &query);

    assert_eq!(stage_chain(&plan), vec!["FETCH", "IXSCAN"]);
    assert_eq!(root(&plan)["inputStage"]["isMultiKey"], json!(true));
    assert_eq!(store.find(&query).unwrap().len(), 7);
}

/// `$in` on the leading field is an index scan.
#[test]
fn test_in_uses_index() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"id_usuario": {"$in": [1, 2]}})));
    let plan = explain(&store, &query);
    assert_eq!(stage_chain(&plan), vec!["FETCH", "IXSCAN"]);
    assert_eq!(plan["executionStats"]["nReturned"], json!(8));
}

/// `$or` over indexed branches is a union; one unindexed branch forces a scan.
#[test]
fn test_or_branches() {
    let store = ordenes();
    let indexed = LogicalQuery::new(
        "ordenes",
        doc(json!({"$or": [{"id_usuario": 0}, {"items": "item2"}]})),
    );
    let plan = explain(&store, &indexed);
    assert_eq!(root(&plan)["stage"], json!("FETCH"));
    assert_eq!(root(&plan)["inputStage"]["stage"], json!("OR"));
    assert_eq!(
        root(&plan)["inputStage"]["inputStages"].as_array().unwrap().len(),
        2
    );

    let mixed = LogicalQuery::new(
        "ordenes",
        doc(json!({"$or": [{"id_usuario": 0}, {"total": 30}]})),
    );
    assert_eq!(stage_chain(&explain(&store, &mixed)), vec!["COLLSCAN"]);
}

/// A missing collection explains as EOF.
#[test]
fn test_missing_collection_eof() {
    let store = ordenes();
    let query = LogicalQuery::new("nada", doc(json!({"a": 1})));
    let plan = explain(&store, &query);
    assert_eq!(stage_chain(&plan), vec!["EOF"]);
    assert_eq!(plan["queryPlanner"]["namespace"], json!("Proyecto2.nada"));
}

// =============================================================================
// Modifier Tests
// =============================================================================

/// Modifiers stack outside the access stage.
#[test]
fn test_modifier_stack() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"id_usuario": 2})))
        .with_sort(doc(json!({"total": -1})))
        .with_skip(1)
        .with_limit(2)
        .with_projection(doc(json!({"total": 1, "_id": 0})));
    let plan = explain(&store, &query);

    assert_eq!(
        stage_chain(&plan),
        vec!["PROJECTION_SIMPLE", "LIMIT", "SKIP", "SORT", "FETCH", "IXSCAN"]
    );
    let results = store.find(&query).unwrap();
    assert_eq!(results, vec![doc(json!({"total": 120})), doc(json!({"total": 70}))]);
}

/// A scan under one modifier is visible to the classifier; under two it is not.
#[test]
fn test_scan_depth_and_classifier() {
    let store = ordenes();
    let one = LogicalQuery::new("ordenes", doc(json!({"total": {"$gt": 50}})))
        .with_limit(3);
    assert!(is_full_scan_value(root(&explain(&store, &one))));

    let two = LogicalQuery::new("ordenes", doc(json!({"total": {"$gt": 50}})))
        .with_skip(1)
        .with_limit(3);
    let plan = explain(&store, &two);
    assert_eq!(stage_chain(&plan), vec!["LIMIT", "SKIP", "COLLSCAN"]);
    assert!(!is_full_scan_value(root(&plan)));
}

/// Query planner verbosity reports the plan without counters.
#[test]
fn test_query_planner_verbosity() {
    let store = ordenes();
    let query = LogicalQuery::new("ordenes", doc(json!({"id_usuario": 1})));
    let plan = store
        .explain(Explainable::Find(&query), Verbosity::QueryPlanner)
        .unwrap();
    assert!(plan.get("executionStats").is_none());
    assert_eq!(plan["queryPlanner"]["winningPlan"]["stage"], json!("FETCH"));
    assert!(plan["queryPlanner"]["winningPlan"].get("nReturned").is_none());
}

// =============================================================================
// Aggregation Tests
// =============================================================================

/// Aggregation explain wraps the match in a cursor stage.
#[test]
fn test_aggregation_explain_layout() {
    let store = ordenes();
    let mut pipeline = AggregationQuery::new("ordenes");
    pipeline.push(Stage::Match(doc(json!({"id_usuario": 4}))));
    pipeline.push(Stage::Sort(doc(json!({"total": 1}))));
    pipeline.push(Stage::Limit(1));

    let plan = store
        .explain(Explainable::Aggregate(&pipeline), Verbosity::ExecutionStats)
        .unwrap();
    let stages = plan["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 3);
    assert_eq!(
        stages[0]["$cursor"]["executionStats"]["executionStages"]["stage"],
        json!("FETCH")
    );
    assert_eq!(stages[1], json!({"$sort": {"total": 1}}));

    let results = store.aggregate(&pipeline).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["total"], json!(40));
}
