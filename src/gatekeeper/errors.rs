//! Gatekeeper errors
//!
//! A rejection is not an error: it is a `Verdict`. Errors here mean the
//! check could not be made at all.

use thiserror::Error;

use super::identifier::InvalidIdError;
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Caller input; the store was never reached
    #[error(transparent)]
    InvalidId(#[from] InvalidIdError),

    /// The plan could not be obtained
    #[error("plan retrieval failed: {0}")]
    Store(#[from] StoreError),
}

impl GateError {
    /// True for failures caused by the request rather than the store
    pub fn is_input_error(&self) -> bool {
        matches!(self, GateError::InvalidId(_))
    }
}
