//! Execution plan stage trees
//!
//! Plans are emitted in the document-database explain layout: every stage is
//! an object with a `stage` name, stage-specific detail fields, and either a
//! single `inputStage` or an `inputStages` array.

use serde::Serialize;
use serde_json::{Map, Value};

/// Full collection scan
pub const COLLSCAN: &str = "COLLSCAN";
/// Index range scan
pub const IXSCAN: &str = "IXSCAN";
/// Document fetch over record ids produced by a child
pub const FETCH: &str = "FETCH";
/// Primary key point lookup
pub const IDHACK: &str = "IDHACK";
/// Union of several index scans
pub const OR: &str = "OR";
/// Empty result without touching data (missing collection)
pub const EOF: &str = "EOF";
/// Blocking in-memory sort
pub const SORT: &str = "SORT";
pub const SKIP: &str = "SKIP";
pub const LIMIT: &str = "LIMIT";
/// Top-level field inclusion projection
pub const PROJECTION_SIMPLE: &str = "PROJECTION_SIMPLE";
/// Any other projection
pub const PROJECTION_DEFAULT: &str = "PROJECTION_DEFAULT";

/// Detail keys that only exist with execution statistics
const STAT_KEYS: [&str; 4] = ["nReturned", "docsExamined", "keysExamined", "dupsDropped"];

/// One node of an execution plan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStage {
    pub stage: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stage: Option<Box<PlanStage>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_stages: Vec<PlanStage>,
}

impl PlanStage {
    /// A stage with no children
    pub fn leaf(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            details: Map::new(),
            input_stage: None,
            input_stages: Vec::new(),
        }
    }

    /// A stage wrapping a single child
    pub fn wrap(stage: impl Into<String>, child: PlanStage) -> Self {
        Self {
            input_stage: Some(Box::new(child)),
            ..Self::leaf(stage)
        }
    }

    /// A stage over several children
    pub fn union(stage: impl Into<String>, children: Vec<PlanStage>) -> Self {
        Self {
            input_stages: children,
            ..Self::leaf(stage)
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// The single nested child, if there is exactly one
    pub fn child(&self) -> Option<&PlanStage> {
        self.input_stage.as_deref()
    }

    /// Reads a stage tree back out of an explain document.
    ///
    /// Tolerant by construction: a missing or non-string `stage` becomes an
    /// empty name, and a non-object `inputStage` is ignored. Returns `None`
    /// only when `value` is not an object at all.
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;

        let stage = map
            .get("stage")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let input_stage = map
            .get("inputStage")
            .and_then(PlanStage::from_value)
            .map(Box::new);
        let input_stages = map
            .get("inputStages")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(PlanStage::from_value).collect())
            .unwrap_or_default();
        let details = map
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "stage" | "inputStage" | "inputStages"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Some(Self {
            stage,
            details,
            input_stage,
            input_stages,
        })
    }

    /// Copy of this tree with execution counters removed
    pub fn without_stats(&self) -> Self {
        let mut details = self.details.clone();
        for key in STAT_KEYS {
            details.shift_remove(key);
        }
        Self {
            stage: self.stage.clone(),
            details,
            input_stage: self.input_stage.as_ref().map(|c| Box::new(c.without_stats())),
            input_stages: self.input_stages.iter().map(PlanStage::without_stats).collect(),
        }
    }

    /// Numeric detail, defaulting to zero
    pub fn counter(&self, key: &str) -> u64 {
        self.details.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    /// Sum of a counter over the whole tree
    pub fn total(&self, key: &str) -> u64 {
        self.counter(key)
            + self.input_stage.as_ref().map_or(0, |c| c.total(key))
            + self.input_stages.iter().map(|c| c.total(key)).sum::<u64>()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
