//! # HTTP Server Module
//!
//! The gateway's HTTP surface: one Axum router over the gatekeeper and the
//! document store.
//!
//! # Endpoints
//!
//! - `/filter`, `/projection`, `/sort`, `/skip`, `/limit`, `/aggregate` - gated reads
//! - `/create/*` - inserts
//! - `/update/*` - gated updates
//! - `/delete/*` - deletes
//! - `/index/*`, `/indexes/:collection` - index management
//! - `/health`, `/observability/*` - health and counters

mod config;
mod errors;
mod index_routes;
mod observability_routes;
mod query_routes;
mod requests;
mod server;
mod state;
mod write_routes;

pub use config::HttpServerConfig;
pub use errors::{ApiError, ApiResult, ErrorResponse, DATABASE_ERROR};
pub use requests::ArrayOperation;
pub use server::{build_router, HttpServer};
pub use state::AppState;
