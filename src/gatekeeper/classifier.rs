//! Plan classification
//!
//! A plan is a full scan when its root stage is `COLLSCAN`, or when the
//! root's single `inputStage` is. Nothing deeper is inspected: a scan two
//! levels down (e.g. `PROJECTION(LIMIT(COLLSCAN))`) passes. Multi-child
//! `inputStages` are not inspected either.

use serde_json::Value;

use crate::store::PlanStage;

/// Stage name of a full collection scan
pub const FULL_SCAN_STAGE: &str = "COLLSCAN";

/// Root or its single child is a collection scan
pub fn is_full_scan(plan: &PlanStage) -> bool {
    plan.stage == FULL_SCAN_STAGE || plan.child().is_some_and(|c| c.stage == FULL_SCAN_STAGE)
}

/// Same check over a raw plan document. Anything that is not a stage
/// object is "not a scan".
pub fn is_full_scan_value(plan: &Value) -> bool {
    PlanStage::from_value(plan).is_some_and(|p| is_full_scan(&p))
}
