//! Observable events
//!
//! Events are explicit and typed. Each maps to a stable upper-case name
//! used as the `event` key of a log line.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Startup begins
    BootStart,
    /// Startup complete, ready to serve
    BootComplete,
    /// Server listening
    Serving,
    /// Shutdown complete
    ShutdownComplete,

    // Configuration
    ConfigLoaded,

    // Store
    /// Store handle connected
    StoreConnected,
    /// Store handle returned to disconnected
    StoreClosed,
    /// Seed file inserted into a collection
    SeedLoaded,
    /// Index declared
    IndexCreated,

    // Gatekeeping
    /// Plan inspected, no full scan
    GateAllowed,
    /// Plan inspected, full scan refused
    GateRejected,
    /// Empty filter, plan not inspected
    GateSkipped,

    // Execution
    QueryExecuted,
    WriteApplied,
    /// Store failure surfaced as an operational error
    OperationFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "INDEXGATE_STARTUP_BEGIN",
            Event::BootComplete => "INDEXGATE_STARTUP_COMPLETE",
            Event::Serving => "INDEXGATE_SERVING",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",

            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::StoreConnected => "STORE_CONNECTED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::SeedLoaded => "SEED_LOADED",
            Event::IndexCreated => "INDEX_CREATED",

            Event::GateAllowed => "GATE_ALLOWED",
            Event::GateRejected => "GATE_REJECTED",
            Event::GateSkipped => "GATE_SKIPPED",

            Event::QueryExecuted => "QUERY_COMPLETE",
            Event::WriteApplied => "WRITE_APPLIED",
            Event::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::GateRejected => Severity::Warn,
            Event::OperationFailed => Severity::Error,
            Event::GateSkipped | Event::GateAllowed => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_upper_snake_case() {
        let events = [
            Event::BootStart,
            Event::StoreConnected,
            Event::GateRejected,
            Event::OperationFailed,
        ];
        for event in events {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'), "{}", name);
        }
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(Event::GateRejected.severity(), Severity::Warn);
        assert_eq!(Event::OperationFailed.severity(), Severity::Error);
        assert_eq!(Event::SeedLoaded.severity(), Severity::Info);
    }
}
