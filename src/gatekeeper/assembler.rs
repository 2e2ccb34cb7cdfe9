//! Aggregation pipeline assembly
//!
//! Stages are appended in a fixed order: `$match`, `$project`, `$sort`,
//! `$skip`, `$limit`. The match stage is built first and on its own so the
//! gatekeeper can inspect it before the shaping stages are added.

use crate::store::{AggregationQuery, Document, Stage};

/// A pipeline holding only the match stage, when the filter is non-empty
pub fn leading(collection: impl Into<String>, filter: Option<Document>) -> AggregationQuery {
    let mut query = AggregationQuery::new(collection);
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        query.push(Stage::Match(filter));
    }
    query
}

/// Appends the shaping stages.
///
/// Projection and sort are appended whenever present, even if empty (the
/// store then reports the error). Skip and limit are appended only when
/// positive.
pub fn append_shaping(
    query: &mut AggregationQuery,
    project: Option<Document>,
    sort: Option<Document>,
    skip: Option<i64>,
    limit: Option<i64>,
) {
    if let Some(project) = project {
        query.push(Stage::Project(project));
    }
    if let Some(sort) = sort {
        query.push(Stage::Sort(sort));
    }
    if let Some(skip) = positive(skip) {
        query.push(Stage::Skip(skip));
    }
    if let Some(limit) = positive(limit) {
        query.push(Stage::Limit(limit));
    }
}

/// The whole pipeline in one call
pub fn assemble(
    collection: impl Into<String>,
    filter: Option<Document>,
    project: Option<Document>,
    sort: Option<Document>,
    skip: Option<i64>,
    limit: Option<i64>,
) -> AggregationQuery {
    let mut query = leading(collection, filter);
    append_shaping(&mut query, project, sort, skip, limit);
    query
}

fn positive(n: Option<i64>) -> Option<u64> {
    n.filter(|n| *n > 0).map(|n| n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StageKind;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_full_pipeline_order() {
        let query = assemble(
            "resenas",
            Some(doc(json!({"rating": {"$gte": 4}}))),
            Some(doc(json!({"comentario": 1}))),
            Some(doc(json!({"rating": -1}))),
            Some(5),
            Some(10),
        );
        assert_eq!(
            query.kinds(),
            vec![
                StageKind::Match,
                StageKind::Project,
                StageKind::Sort,
                StageKind::Skip,
                StageKind::Limit
            ]
        );
    }

    #[test]
    fn test_empty_match_and_zero_pagination_dropped() {
        let query = assemble("resenas", Some(Document::new()), None, None, Some(0), Some(-3));
        assert!(query.stages.is_empty());
    }

    #[test]
    fn test_empty_project_and_sort_kept() {
        let query = assemble(
            "resenas",
            None,
            Some(Document::new()),
            Some(Document::new()),
            None,
            Some(2),
        );
        assert_eq!(
            query.kinds(),
            vec![StageKind::Project, StageKind::Sort, StageKind::Limit]
        );
        assert_eq!(query.stages[2], Stage::Limit(2));
    }

    #[test]
    fn test_leading_then_shaping() {
        let mut query = leading("c", Some(doc(json!({"a": 1}))));
        assert_eq!(query.kinds(), vec![StageKind::Match]);
        append_shaping(&mut query, None, None, Some(3), None);
        assert_eq!(query.kinds(), vec![StageKind::Match, StageKind::Skip]);
    }
}
