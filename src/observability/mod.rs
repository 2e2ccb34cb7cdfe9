//! Observability
//!
//! - Structured logging (JSON, one line per event)
//! - Atomic counters served at `/observability/metrics`
//!
//! HTTP access logs are separate: they go through `tracing` and
//! `tower_http::trace::TraceLayer`.
//!
//! # Usage
//!
//! ```ignore
//! use indexgate::observability::{log_event_with_fields, Event, MetricsRegistry};
//!
//! log_event_with_fields(Event::GateRejected, &[("collection", "resenas")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_gate_rejected();
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log an event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = event.severity();
    if severity >= Severity::Error {
        Logger::log_stderr(severity, event.as_str(), fields);
    } else {
        Logger::log(severity, event.as_str(), fields);
    }
}
