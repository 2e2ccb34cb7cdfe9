//! Logical query shapes handed to the store
//!
//! A `LogicalQuery` is a find with optional shape modifiers; an
//! `AggregationQuery` is an ordered list of pipeline stages. Both are
//! opaque to the store's callers: filters, projections and sort
//! specifications are passed through as documents.

use serde_json::{json, Value};

use super::document::Document;

/// Optional shape modifiers layered over a filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindModifiers {
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// A find against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalQuery {
    pub collection: String,
    pub filter: Document,
    pub modifiers: FindModifiers,
}

impl LogicalQuery {
    /// Creates a find with no modifiers
    pub fn new(collection: impl Into<String>, filter: Document) -> Self {
        Self {
            collection: collection.into(),
            filter,
            modifiers: FindModifiers::default(),
        }
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.modifiers.projection = Some(projection);
        self
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.modifiers.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.modifiers.skip = Some(skip);
        self
    }

    /// Limit of zero means "no limit"
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.modifiers.limit = Some(limit);
        self
    }

    /// True when the filter carries at least one predicate key
    pub fn has_predicates(&self) -> bool {
        !self.filter.is_empty()
    }
}

/// Pipeline stage kinds, in their only legal assembly order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageKind {
    Match,
    Project,
    Sort,
    Skip,
    Limit,
}

impl StageKind {
    /// Pipeline operator name
    pub fn operator(&self) -> &'static str {
        match self {
            StageKind::Match => "$match",
            StageKind::Project => "$project",
            StageKind::Sort => "$sort",
            StageKind::Skip => "$skip",
            StageKind::Limit => "$limit",
        }
    }
}

/// One pipeline stage with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Project(Document),
    Sort(Document),
    Skip(u64),
    Limit(u64),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Match(_) => StageKind::Match,
            Stage::Project(_) => StageKind::Project,
            Stage::Sort(_) => StageKind::Sort,
            Stage::Skip(_) => StageKind::Skip,
            Stage::Limit(_) => StageKind::Limit,
        }
    }

    /// Wire form, e.g. `{"$match": {...}}`
    pub fn to_value(&self) -> Value {
        let payload = match self {
            Stage::Match(d) | Stage::Project(d) | Stage::Sort(d) => Value::Object(d.clone()),
            Stage::Skip(n) | Stage::Limit(n) => json!(n),
        };
        json!({ self.kind().operator(): payload })
    }
}

/// An aggregation pipeline against one collection
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationQuery {
    pub collection: String,
    pub stages: Vec<Stage>,
}

impl AggregationQuery {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Stage kinds in pipeline order
    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// Filter of the leading `$match` stage, if any
    pub fn leading_match(&self) -> Option<&Document> {
        match self.stages.first() {
            Some(Stage::Match(filter)) => Some(filter),
            _ => None,
        }
    }

    /// Wire form of the whole pipeline
    pub fn pipeline(&self) -> Value {
        Value::Array(self.stages.iter().map(Stage::to_value).collect())
    }
}

/// Something the store can produce an execution plan for
#[derive(Debug, Clone, Copy)]
pub enum Explainable<'a> {
    Find(&'a LogicalQuery),
    Aggregate(&'a AggregationQuery),
}

impl<'a> Explainable<'a> {
    pub fn collection(&self) -> &'a str {
        match self {
            Explainable::Find(q) => &q.collection,
            Explainable::Aggregate(q) => &q.collection,
        }
    }

    /// The predicate document the planner will see.
    ///
    /// For pipelines this is the leading `$match`; a pipeline without one
    /// has no predicate.
    pub fn filter(&self) -> Option<&'a Document> {
        match self {
            Explainable::Find(q) => Some(&q.filter),
            Explainable::Aggregate(q) => q.leading_match(),
        }
    }
}

/// How much detail an explain call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Winning plan only
    QueryPlanner,
    /// Winning plan plus per-stage execution counters
    ExecutionStats,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::QueryPlanner => "queryPlanner",
            Verbosity::ExecutionStats => "executionStats",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_builder_sets_modifiers() {
        let q = LogicalQuery::new("orders", doc(json!({"estado": "Completado"})))
            .with_sort(doc(json!({"fecha": -1})))
            .with_limit(5);

        assert!(q.has_predicates());
        assert_eq!(q.modifiers.limit, Some(5));
        assert!(q.modifiers.projection.is_none());
    }

    #[test]
    fn test_stage_wire_form() {
        assert_eq!(Stage::Skip(3).to_value(), json!({"$skip": 3}));
        assert_eq!(
            Stage::Match(doc(json!({"a": 1}))).to_value(),
            json!({"$match": {"a": 1}})
        );
    }

    #[test]
    fn test_leading_match() {
        let mut q = AggregationQuery::new("resenas");
        assert!(q.leading_match().is_none());
        q.push(Stage::Limit(2));
        assert!(q.leading_match().is_none());

        let mut q = AggregationQuery::new("resenas");
        q.push(Stage::Match(doc(json!({"rating": 5}))));
        assert_eq!(q.leading_match(), Some(&doc(json!({"rating": 5}))));
        assert_eq!(Explainable::Aggregate(&q).filter(), q.leading_match());
    }
}
