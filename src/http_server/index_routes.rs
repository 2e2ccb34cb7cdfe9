//! Index HTTP Routes
//!
//! Index declaration and listing. These are the only way to make a
//! rejected query acceptable, so they are never gated.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use super::errors::{ApiError, ApiResult};
use super::requests::{
    require_collection, require_field, require_non_empty, CompoundIndexRequest,
    MultikeyIndexRequest, SimpleIndexRequest,
};
use super::state::AppState;
use crate::observability::{log_event_with_fields, Event};
use crate::store::{Document, IndexOptions};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCreated {
    pub message: String,
    pub index_name: String,
}

#[derive(Debug, Serialize)]
pub struct IndexList {
    pub collection: String,
    pub indexes: Vec<Value>,
}

pub fn index_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/index/simple", post(simple_index_handler))
        .route("/index/compound", post(compound_index_handler))
        .route("/index/multikey", post(multikey_index_handler))
        .route("/indexes/:collection", get(list_indexes_handler))
        .with_state(state)
}

fn create_index(
    state: &AppState,
    kind: &str,
    collection: &str,
    keys: &Document,
    options: IndexOptions,
) -> ApiResult<(StatusCode, Json<IndexCreated>)> {
    let index_name = state.store()?.create_index(collection, keys, options)?;
    log_event_with_fields(
        Event::IndexCreated,
        &[("collection", collection), ("index", index_name.as_str())],
    );

    Ok((
        StatusCode::CREATED,
        Json(IndexCreated {
            message: format!("{} index created", kind),
            index_name,
        }),
    ))
}

fn ascending(field: String) -> Document {
    let mut keys = Document::new();
    keys.insert(field, json!(1));
    keys
}

async fn simple_index_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SimpleIndexRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IndexCreated>)> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let field = require_field("field", request.field)?;

    create_index(&state, "Simple", &collection, &ascending(field), request.options)
}

/// Field order in the request is the key order of the index
async fn compound_index_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CompoundIndexRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IndexCreated>)> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let fields = require_non_empty("fields", request.fields)?;
    if fields.values().any(|d| d.as_i64() != Some(1) && d.as_i64() != Some(-1)) {
        return Err(ApiError::InvalidParam(
            "index directions must be 1 or -1".into(),
        ));
    }

    create_index(&state, "Compound", &collection, &fields, request.options)
}

async fn multikey_index_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<MultikeyIndexRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<IndexCreated>)> {
    let Json(request) = body?;
    let collection = require_collection(request.collection)?;
    let field = require_field("arrayField", request.array_field)?;

    create_index(&state, "Multikey", &collection, &ascending(field), request.options)
}

async fn list_indexes_handler(
    State(state): State<Arc<AppState>>,
    Path(collection): Path<String>,
) -> ApiResult<Json<IndexList>> {
    let collection = require_collection(Some(collection))?;
    let indexes = state
        .store()?
        .list_indexes(&collection)?
        .iter()
        .map(|spec| spec.to_value())
        .collect();

    Ok(Json(IndexList {
        collection,
        indexes,
    }))
}
