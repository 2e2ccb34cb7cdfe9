//! Write HTTP Routes
//!
//! Inserts, updates and deletes. Updates are gated on the find that would
//! locate their targets; inserts and deletes are not gated.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use super::errors::{ApiError, ApiResult};
use super::requests::{
    require_collection, require_document, require_field, require_non_empty, ArrayUpdateRequest,
    CreateManyRequest, CreateOneRequest, DeleteRequest, UpdateRequest,
};
use super::state::AppState;
use crate::gatekeeper::Operation;
use crate::observability::{log_event_with_fields, Event};
use crate::store::{Document, UpdateOutcome};

// ==================
// Response Types
// ==================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedOne {
    pub message: String,
    pub inserted_id: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedMany {
    pub message: String,
    pub inserted_count: usize,
    pub inserted_ids: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMany {
    pub message: String,
    pub deleted_count: u64,
}

// ==================
// Write Routes
// ==================

pub fn write_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/create/oneDocument", post(create_one_handler))
        .route("/create/manyDocuments", post(create_many_handler))
        .route("/update/oneDocument", put(update_one_handler))
        .route("/update/manyDocuments", put(update_many_handler))
        .route("/update/array", put(update_array_handler))
        .route("/delete/oneDocument", delete(delete_one_handler))
        .route("/delete/multipleDocuments", delete(delete_many_handler))
        .with_state(state)
}

fn record_write(state: &AppState, operation: &str, collection: &str, affected: u64) {
    state.metrics.increment_writes_applied();
    let affected = affected.to_string();
    log_event_with_fields(
        Event::WriteApplied,
        &[
            ("operation", operation),
            ("collection", collection),
            ("affected", affected.as_str()),
        ],
    );
}

/// Normalize and gate the filter, then apply the update
fn gated_update(
    state: &AppState,
    operation: Operation,
    collection: &str,
    filter: Document,
    update: &Document,
) -> ApiResult<UpdateOutcome> {
    let store = state.store()?;
    let (query, verdict) =
        state
            .gatekeeper
            .check_update(store.as_ref(), operation, collection, filter)?;
    if !verdict.allowed {
        return Err(ApiError::rejected(verdict));
    }

    let outcome = match operation {
        Operation::UpdateOne => store.update_one(collection, &query.filter, update)?,
        // array updates touch every match, like updateMany
        _ => store.update_many(collection, &query.filter, update)?,
    };
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound(
            "No document matches the filter".to_string(),
        ));
    }

    record_write(state, operation.as_str(), collection, outcome.modified_count);
    Ok(outcome)
}

// ==================
// Create Handlers
// ==================

async fn create_one_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateOneRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InsertedOne>)> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let data = require_document("data", request.data)?;

    let inserted_id = state.store()?.insert_one(&collection, data)?;
    record_write(&state, "insertOne", &collection, 1);

    Ok((
        StatusCode::CREATED,
        Json(InsertedOne {
            message: "Document created".to_string(),
            inserted_id,
        }),
    ))
}

async fn create_many_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateManyRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<InsertedMany>)> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let documents = request
        .documents
        .ok_or_else(|| ApiError::MissingParam("documents".into()))?;
    if documents.is_empty() {
        return Err(ApiError::InvalidParam(
            "documents must contain at least one document".into(),
        ));
    }

    let outcome = state.store()?.insert_many(&collection, documents)?;
    let inserted_count = outcome.inserted_ids.len();
    record_write(&state, "insertMany", &collection, inserted_count as u64);

    Ok((
        StatusCode::CREATED,
        Json(InsertedMany {
            message: format!("{} documents created", inserted_count),
            inserted_count,
            inserted_ids: outcome.inserted_ids,
        }),
    ))
}

// ==================
// Update Handlers
// ==================

async fn update_one_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateOutcome>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let filter = require_document("filter", request.filter)?;
    let update = require_document("update", request.update)?;

    let outcome = gated_update(&state, Operation::UpdateOne, &collection, filter, &update)?;
    Ok(Json(outcome))
}

async fn update_many_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UpdateRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateOutcome>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let filter = require_document("filter", request.filter)?;
    let update = require_document("update", request.update)?;

    let outcome = gated_update(&state, Operation::UpdateMany, &collection, filter, &update)?;
    Ok(Json(outcome))
}

async fn update_array_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ArrayUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<UpdateOutcome>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let filter = require_document("filter", request.filter)?;
    let field = require_field("arrayField", request.array_field)?;
    let value = request
        .value
        .ok_or_else(|| ApiError::MissingParam("value".into()))?;

    let update = ArrayUpdateRequest::update_document(&field, request.operation, value);
    let outcome = gated_update(&state, Operation::ArrayUpdate, &collection, filter, &update)?;
    Ok(Json(outcome))
}

// ==================
// Delete Handlers
// ==================

async fn delete_one_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let filter = require_non_empty("filter", request.filter)?;

    let outcome = state.store()?.delete_one(&collection, &filter)?;
    if outcome.deleted_count == 0 {
        return Err(ApiError::NotFound(
            "No document matches the filter".to_string(),
        ));
    }
    record_write(&state, "deleteOne", &collection, outcome.deleted_count);

    Ok(Json(MessageResponse {
        message: "Document deleted".to_string(),
    }))
}

async fn delete_many_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<DeletedMany>> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let filter = require_non_empty("filter", request.filter)?;

    let outcome = state.store()?.delete_many(&collection, &filter)?;
    if outcome.deleted_count == 0 {
        return Err(ApiError::NotFound(
            "No documents match the filter".to_string(),
        ));
    }
    record_write(&state, "deleteMany", &collection, outcome.deleted_count);

    Ok(Json(DeletedMany {
        message: format!("{} documents deleted", outcome.deleted_count),
        deleted_count: outcome.deleted_count,
    }))
}
