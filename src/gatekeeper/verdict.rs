//! Verdicts and the operations that request them

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Outcome of one authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// What an empty filter means for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPolicy {
    /// Inspect the plan even when the filter is empty
    AlwaysEvaluate,
    /// An empty filter is allowed without asking for a plan
    SkipWhenEmpty,
}

/// A gatekept operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Filter,
    Projection,
    Sort,
    Skip,
    Limit,
    UpdateOne,
    UpdateMany,
    ArrayUpdate,
    Aggregate,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::Filter,
        Operation::Projection,
        Operation::Sort,
        Operation::Skip,
        Operation::Limit,
        Operation::UpdateOne,
        Operation::UpdateMany,
        Operation::ArrayUpdate,
        Operation::Aggregate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Filter => "filter",
            Operation::Projection => "projection",
            Operation::Sort => "sort",
            Operation::Skip => "skip",
            Operation::Limit => "limit",
            Operation::UpdateOne => "updateOne",
            Operation::UpdateMany => "updateMany",
            Operation::ArrayUpdate => "arrayUpdate",
            Operation::Aggregate => "aggregate",
        }
    }

    /// Only the plain filter read inspects plans for empty filters
    pub fn filter_policy(&self) -> FilterPolicy {
        match self {
            Operation::Filter => FilterPolicy::AlwaysEvaluate,
            _ => FilterPolicy::SkipWhenEmpty,
        }
    }

    /// Reason returned when the plan is a full scan
    pub fn rejection_message(&self) -> &'static str {
        match self {
            Operation::Filter => {
                "Query rejected: the filter would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::Projection => {
                "Projection rejected: the filter would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::Sort => {
                "Sort rejected: the query would require a full collection scan (COLLSCAN). Create an index on the filtered or sorted fields."
            }
            Operation::Skip => {
                "Skip rejected: the filter would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::Limit => {
                "Limit rejected: the filter would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::UpdateOne => {
                "Update rejected: locating the document would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::UpdateMany => {
                "Update rejected: locating the documents would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::ArrayUpdate => {
                "Array update rejected: locating the documents would require a full collection scan (COLLSCAN). Create an index on the filtered fields."
            }
            Operation::Aggregate => {
                "Aggregation rejected: the $match stage would require a full collection scan (COLLSCAN). Create an index on the matched fields."
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Operation::ALL.iter().map(Operation::as_str).collect();
                format!("unknown operation '{}', expected one of: {}", s, names.join(", "))
            })
    }
}
