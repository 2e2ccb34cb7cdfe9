//! Index-usage gatekeeper
//!
//! Before a filtered read, update or aggregation runs, the store is asked
//! for the execution plan of that exact query. A plan that would scan the
//! whole collection is rejected; anything else is allowed. The query runs
//! only after an allow.
//!
//! # Design
//!
//! - One decision routine (`authorize`) shared by every gatekept endpoint
//! - Plans are produced per request and never cached
//! - The classifier looks at the root stage and its single child only; a
//!   scan nested deeper is not detected
//! - A rejection is a `Verdict`, never an error
//! - The gatekeeper never writes

mod assembler;
mod classifier;
mod errors;
mod gate;
mod identifier;
mod verdict;

pub use assembler::{append_shaping, assemble, leading};
pub use classifier::{is_full_scan, is_full_scan_value, FULL_SCAN_STAGE};
pub use errors::GateError;
pub use gate::{authorize, needs_plan, Gatekeeper};
pub use identifier::{normalize_filter_id, normalize_id, InvalidIdError};
pub use verdict::{FilterPolicy, Operation, Verdict};
