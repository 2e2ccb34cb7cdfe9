//! Field projections
//!
//! A projection is either inclusive (`{"nombre": 1}`) or exclusive
//! (`{"notas": 0}`). `_id` is kept unless excluded explicitly, and is the
//! only field allowed to break the inclusive/exclusive rule.

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::document::{Document, ID_FIELD};
use super::errors::{StoreError, StoreResult};

/// Parsed projection
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Empty projection; documents pass through unchanged
    Identity,
    Include { paths: Vec<String>, include_id: bool },
    Exclude { paths: Vec<String> },
}

#[derive(Debug, Default)]
struct PathTree {
    leaf: bool,
    children: HashMap<String, PathTree>,
}

impl PathTree {
    fn build<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut root = PathTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.split('.') {
                node = node.children.entry(segment.to_string()).or_default();
            }
            node.leaf = true;
        }
        root
    }
}

impl Projection {
    pub fn parse(spec: &Document) -> StoreResult<Self> {
        if spec.is_empty() {
            return Ok(Projection::Identity);
        }

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut id_flag = None;

        for (path, flag) in spec {
            let keep = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                other => {
                    return Err(StoreError::InvalidProjection(format!(
                        "unsupported projection value for '{}': {}",
                        path, other
                    )))
                }
            };
            if path.is_empty() || path.starts_with('$') {
                return Err(StoreError::InvalidProjection(format!(
                    "invalid projection path '{}'",
                    path
                )));
            }
            if path == ID_FIELD {
                id_flag = Some(keep);
            } else if keep {
                included.push(path.clone());
            } else {
                excluded.push(path.clone());
            }
        }

        if !included.is_empty() && !excluded.is_empty() {
            return Err(StoreError::InvalidProjection(
                "cannot mix inclusion and exclusion".into(),
            ));
        }

        if !included.is_empty() || id_flag == Some(true) {
            return Ok(Projection::Include {
                paths: included,
                include_id: id_flag.unwrap_or(true),
            });
        }

        if id_flag == Some(false) {
            excluded.push(ID_FIELD.to_string());
        }
        Ok(Projection::Exclude { paths: excluded })
    }

    /// Top-level inclusion only
    pub fn is_simple(&self) -> bool {
        match self {
            Projection::Include { paths, .. } => paths.iter().all(|p| !p.contains('.')),
            _ => false,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Projection::Identity)
    }

    pub fn apply(&self, document: &Document) -> Document {
        match self {
            Projection::Identity => document.clone(),
            Projection::Include { paths, include_id } => {
                let mut all: Vec<&str> = paths.iter().map(String::as_str).collect();
                if *include_id {
                    all.push(ID_FIELD);
                }
                include(document, &PathTree::build(all))
            }
            Projection::Exclude { paths } => {
                exclude(document, &PathTree::build(paths.iter().map(String::as_str)))
            }
        }
    }
}

fn include(source: &Map<String, Value>, tree: &PathTree) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in source {
        let Some(node) = tree.children.get(key) else {
            continue;
        };
        if node.leaf {
            out.insert(key.clone(), value.clone());
            continue;
        }
        match value {
            Value::Object(inner) => {
                out.insert(key.clone(), Value::Object(include(inner, node)));
            }
            Value::Array(items) => {
                let projected = items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|m| Value::Object(include(m, node)))
                    .collect();
                out.insert(key.clone(), Value::Array(projected));
            }
            _ => {}
        }
    }
    out
}

fn exclude(source: &Map<String, Value>, tree: &PathTree) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in source {
        let Some(node) = tree.children.get(key) else {
            out.insert(key.clone(), value.clone());
            continue;
        };
        if node.leaf {
            continue;
        }
        let kept = match value {
            Value::Object(inner) => Value::Object(exclude(inner, node)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(m) => Value::Object(exclude(m, node)),
                        other => other.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        };
        out.insert(key.clone(), kept);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn project(spec: Value, document: Value) -> Value {
        let projection = Projection::parse(&doc(spec)).unwrap();
        Value::Object(projection.apply(&doc(document)))
    }

    #[test]
    fn test_inclusion_keeps_id_by_default() {
        let out = project(
            json!({"nombre": 1}),
            json!({"_id": 1, "nombre": "Cafe", "rating": 4}),
        );
        assert_eq!(out, json!({"_id": 1, "nombre": "Cafe"}));
    }

    #[test]
    fn test_inclusion_can_drop_id() {
        let out = project(
            json!({"nombre": 1, "_id": 0}),
            json!({"_id": 1, "nombre": "Cafe", "rating": 4}),
        );
        assert_eq!(out, json!({"nombre": "Cafe"}));
    }

    #[test]
    fn test_exclusion() {
        let out = project(
            json!({"rating": 0}),
            json!({"_id": 1, "nombre": "Cafe", "rating": 4}),
        );
        assert_eq!(out, json!({"_id": 1, "nombre": "Cafe"}));
    }

    #[test]
    fn test_dotted_paths() {
        let source = json!({"_id": 1, "dir": {"ciudad": "Cartago", "calle": "5"}, "items": [{"a": 1, "b": 2}]});
        assert_eq!(
            project(json!({"dir.ciudad": 1, "items.a": 1, "_id": 0}), source.clone()),
            json!({"dir": {"ciudad": "Cartago"}, "items": [{"a": 1}]})
        );
        assert_eq!(
            project(json!({"dir.calle": 0}), source),
            json!({"_id": 1, "dir": {"ciudad": "Cartago"}, "items": [{"a": 1, "b": 2}]})
        );
    }

    #[test]
    fn test_mixing_is_rejected() {
        assert!(Projection::parse(&doc(json!({"a": 1, "b": 0}))).is_err());
        assert!(Projection::parse(&doc(json!({"a": "yes"}))).is_err());
    }

    #[test]
    fn test_simple_classification() {
        assert!(Projection::parse(&doc(json!({"a": 1}))).unwrap().is_simple());
        assert!(!Projection::parse(&doc(json!({"a.b": 1}))).unwrap().is_simple());
        assert!(!Projection::parse(&doc(json!({"a": 0}))).unwrap().is_simple());
        assert!(Projection::parse(&doc(json!({}))).unwrap().is_identity());
    }
}
