//! The gate
//!
//! `authorize` is the single decision routine. Every gatekept endpoint
//! calls it through `Gatekeeper`, which adds logging and counters.

use std::sync::Arc;

use serde_json::Value;

use super::classifier::is_full_scan;
use super::errors::GateError;
use super::identifier::normalize_filter_id;
use super::verdict::{FilterPolicy, Operation, Verdict};
use super::assembler;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::{
    AggregationQuery, Document, DocumentStore, Explainable, LogicalQuery, PlanStage, StoreResult,
    Verbosity,
};

/// Whether `operation` on `target` needs a plan at all
pub fn needs_plan(operation: Operation, target: Explainable<'_>) -> bool {
    match operation.filter_policy() {
        FilterPolicy::AlwaysEvaluate => true,
        FilterPolicy::SkipWhenEmpty => target.filter().is_some_and(|f| !f.is_empty()),
    }
}

/// Decides whether `target` may run.
///
/// Explain is called at most once, with execution stats. A plan that has
/// no reachable root stage counts as "no scan detected".
pub fn authorize(
    store: &dyn DocumentStore,
    operation: Operation,
    target: Explainable<'_>,
) -> StoreResult<Verdict> {
    if !needs_plan(operation, target) {
        return Ok(Verdict::allow());
    }

    let explain = store.explain(target, Verbosity::ExecutionStats)?;
    let scan = execution_root(&explain, target)
        .and_then(PlanStage::from_value)
        .is_some_and(|root| is_full_scan(&root));

    if scan {
        Ok(Verdict::reject(operation.rejection_message()))
    } else {
        Ok(Verdict::allow())
    }
}

/// Root execution stage of an explain document
fn execution_root<'a>(explain: &'a Value, target: Explainable<'_>) -> Option<&'a Value> {
    let find_root = |v: &'a Value| v.get("executionStats")?.get("executionStages");

    match target {
        Explainable::Find(_) => find_root(explain),
        Explainable::Aggregate(_) => match explain.get("stages") {
            Some(Value::Array(stages)) => {
                let first = stages.first()?;
                find_root(first.get("$cursor").or_else(|| first.get("cursorStage"))?)
            }
            // Single-stage pipelines may be explained as a plain find
            _ => find_root(explain),
        },
    }
}

/// `authorize` plus logging and metrics
#[derive(Debug, Clone, Default)]
pub struct Gatekeeper {
    metrics: Arc<MetricsRegistry>,
}

impl Gatekeeper {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Checks a prepared query
    pub fn check(
        &self,
        store: &dyn DocumentStore,
        operation: Operation,
        target: Explainable<'_>,
    ) -> StoreResult<Verdict> {
        let fields = [
            ("operation", operation.as_str()),
            ("collection", target.collection()),
        ];

        if !needs_plan(operation, target) {
            self.metrics.increment_gate_skipped();
            log_event_with_fields(Event::GateSkipped, &fields);
            return Ok(Verdict::allow());
        }

        let verdict = authorize(store, operation, target)?;
        if verdict.allowed {
            self.metrics.increment_gate_allowed();
            log_event_with_fields(Event::GateAllowed, &fields);
        } else {
            self.metrics.increment_gate_rejected();
            log_event_with_fields(Event::GateRejected, &fields);
        }
        Ok(verdict)
    }

    /// Normalizes an update filter and checks the find that would locate
    /// its targets. The normalized query is returned for execution.
    pub fn check_update(
        &self,
        store: &dyn DocumentStore,
        operation: Operation,
        collection: &str,
        mut filter: Document,
    ) -> Result<(LogicalQuery, Verdict), GateError> {
        normalize_filter_id(&mut filter)?;
        let query = LogicalQuery::new(collection, filter);
        let verdict = self.check(store, operation, Explainable::Find(&query))?;
        Ok((query, verdict))
    }

    /// Normalizes and checks the match stage of a pipeline. The returned
    /// pipeline holds only that stage; shaping stages are appended after.
    pub fn check_aggregation(
        &self,
        store: &dyn DocumentStore,
        collection: &str,
        filter: Option<Document>,
    ) -> Result<(AggregationQuery, Verdict), GateError> {
        let filter = match filter {
            Some(mut filter) => {
                normalize_filter_id(&mut filter)?;
                Some(filter)
            }
            None => None,
        };
        let query = assembler::leading(collection, filter);
        let verdict = self.check(store, Operation::Aggregate, Explainable::Aggregate(&query))?;
        Ok((query, verdict))
    }
}
