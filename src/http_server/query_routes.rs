//! Query HTTP Routes
//!
//! Filtered reads, their modifiers and aggregation. Each handler builds the
//! exact query it will run, asks the gatekeeper about it, and runs it only
//! after an allow.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;

use super::errors::{ApiError, ApiResult};
use super::requests::{
    non_empty, require_collection, AggregateRequest, FilterRequest, LimitRequest,
    ProjectionRequest, SkipRequest, SortRequest,
};
use super::state::AppState;
use crate::gatekeeper::{append_shaping, Operation};
use crate::observability::{log_event_with_fields, Event};
use crate::store::{Document, Explainable, LogicalQuery};

// ==================
// Response Types
// ==================

#[derive(Debug, Serialize)]
pub struct CountedResults {
    pub count: usize,
    pub results: Vec<Document>,
}

impl From<Vec<Document>> for CountedResults {
    fn from(results: Vec<Document>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Results {
    pub results: Vec<Document>,
}

// ==================
// Query Routes
// ==================

pub fn query_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/filter", post(filter_handler))
        .route("/projection", post(projection_handler))
        .route("/sort", post(sort_handler))
        .route("/skip", post(skip_handler))
        .route("/limit", post(limit_handler))
        .route("/aggregate", post(aggregate_handler))
        .with_state(state)
}

/// Gate, then run, a find
fn gated_find(
    state: &AppState,
    operation: Operation,
    query: &LogicalQuery,
) -> ApiResult<Vec<Document>> {
    let store = state.store()?;
    let verdict = state
        .gatekeeper
        .check(store.as_ref(), operation, Explainable::Find(query))?;
    if !verdict.allowed {
        return Err(ApiError::rejected(verdict));
    }

    let documents = store.find(query)?;
    record_query(state, operation, &query.collection, documents.len());
    Ok(documents)
}

fn record_query(state: &AppState, operation: Operation, collection: &str, returned: usize) {
    state.metrics.increment_queries_executed();
    let returned = returned.to_string();
    log_event_with_fields(
        Event::QueryExecuted,
        &[
            ("operation", operation.as_str()),
            ("collection", collection),
            ("returned", returned.as_str()),
        ],
    );
}

// ==================
// Handlers
// ==================

async fn filter_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<FilterRequest>, JsonRejection>,
) -> ApiResult<Json<CountedResults>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;

    let query = LogicalQuery::new(collection, request.filter);
    let documents = gated_find(&state, Operation::Filter, &query)?;
    Ok(Json(documents.into()))
}

async fn projection_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ProjectionRequest>, JsonRejection>,
) -> ApiResult<Json<CountedResults>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let projection = non_empty("projection", request.projection)?;

    let query = LogicalQuery::new(collection, request.filter).with_projection(projection);
    let documents = gated_find(&state, Operation::Projection, &query)?;
    Ok(Json(documents.into()))
}

async fn sort_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SortRequest>, JsonRejection>,
) -> ApiResult<Json<CountedResults>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let sort = non_empty("sort", request.sort)?;

    let query = LogicalQuery::new(collection, request.filter).with_sort(sort);
    let documents = gated_find(&state, Operation::Sort, &query)?;
    Ok(Json(documents.into()))
}

async fn skip_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SkipRequest>, JsonRejection>,
) -> ApiResult<Json<Results>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;

    let query = LogicalQuery::new(collection, request.filter).with_skip(request.skip);
    let results = gated_find(&state, Operation::Skip, &query)?;
    Ok(Json(Results { results }))
}

async fn limit_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LimitRequest>, JsonRejection>,
) -> ApiResult<Json<Results>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;

    let query = LogicalQuery::new(collection, request.filter).with_limit(request.limit);
    let results = gated_find(&state, Operation::Limit, &query)?;
    Ok(Json(Results { results }))
}

/// Only the `$match` stage is gated; shaping stages are appended after the
/// allow.
async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AggregateRequest>, JsonRejection>,
) -> ApiResult<Json<CountedResults>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let store = state.store()?;

    let (mut pipeline, verdict) =
        state
            .gatekeeper
            .check_aggregation(store.as_ref(), &collection, request.filter)?;
    if !verdict.allowed {
        return Err(ApiError::rejected(verdict));
    }

    append_shaping(
        &mut pipeline,
        request.project,
        request.sort,
        request.skip,
        request.limit,
    );
    let documents = store.aggregate(&pipeline)?;
    record_query(&state, Operation::Aggregate, &collection, documents.len());
    Ok(Json(documents.into()))
}
