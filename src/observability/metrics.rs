//! Metrics registry
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters.
///
/// Relaxed ordering throughout; counters are independent of each other.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Plans inspected or skipped by the gatekeeper
    gate_checks: AtomicU64,
    gate_allowed: AtomicU64,
    gate_rejected: AtomicU64,
    /// Checks that skipped the plan because the filter was empty
    gate_skipped: AtomicU64,
    queries_executed: AtomicU64,
    writes_applied: AtomicU64,
    operational_errors: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Gatekeeper

    pub fn increment_gate_allowed(&self) {
        self.gate_checks.fetch_add(1, Ordering::Relaxed);
        self.gate_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gate_rejected(&self) {
        self.gate_checks.fetch_add(1, Ordering::Relaxed);
        self.gate_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A skipped check still counts as allowed
    pub fn increment_gate_skipped(&self) {
        self.increment_gate_allowed();
        self.gate_skipped.fetch_add(1, Ordering::Relaxed);
    }

    // Execution

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_writes_applied(&self) {
        self.writes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_operational_errors(&self) {
        self.operational_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gate_checks: self.gate_checks.load(Ordering::Relaxed),
            gate_allowed: self.gate_allowed.load(Ordering::Relaxed),
            gate_rejected: self.gate_rejected.load(Ordering::Relaxed),
            gate_skipped: self.gate_skipped.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            writes_applied: self.writes_applied.load(Ordering::Relaxed),
            operational_errors: self.operational_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub gate_checks: u64,
    pub gate_allowed: u64,
    pub gate_rejected: u64,
    pub gate_skipped: u64,
    pub queries_executed: u64,
    pub writes_applied: u64,
    pub operational_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_gate_counters() {
        let metrics = MetricsRegistry::new();
        metrics.increment_gate_allowed();
        metrics.increment_gate_rejected();
        metrics.increment_gate_skipped();

        let snap = metrics.snapshot();
        assert_eq!(snap.gate_checks, 3);
        assert_eq!(snap.gate_allowed, 2);
        assert_eq!(snap.gate_rejected, 1);
        assert_eq!(snap.gate_skipped, 1);
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let metrics = MetricsRegistry::new();
        metrics.increment_writes_applied();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["writes_applied"], 1);
        assert_eq!(json["operational_errors"], 0);
    }
}
