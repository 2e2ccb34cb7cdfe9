//! indexgate - a document query gateway that refuses full collection scans
//!
//! Every filtered read, update and aggregation is explained by the store
//! first. If the winning plan is a collection scan the request is rejected
//! with a hint to create an index; otherwise it runs.
//!
//! - `store`: the document store trait and its in-memory implementation
//! - `gatekeeper`: plan classification and the authorization routine
//! - `http_server`: the HTTP surface
//! - `cli`: `serve`, `explain` and `check-config`
//! - `observability`: structured event log and counters

pub mod cli;
pub mod gatekeeper;
pub mod http_server;
pub mod observability;
pub mod store;
