//! Result ordering
//!
//! Multi-key, stable sort. An array field sorts by its smallest element
//! ascending and by its largest element descending.

use std::cmp::Ordering;

use serde_json::Value;

use super::document::{resolve_path, Document};
use super::errors::{StoreError, StoreResult};
use super::value::total_order;

static NULL: Value = Value::Null;

/// Parsed sort specification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    pub keys: Vec<(String, i32)>,
}

impl SortSpec {
    /// Parses `{"field": 1, "other": -1}`, preserving key order
    pub fn parse(spec: &Document) -> StoreResult<Self> {
        let mut keys = Vec::with_capacity(spec.len());
        for (field, direction) in spec {
            let dir = match direction.as_f64() {
                Some(d) if d == 1.0 => 1,
                Some(d) if d == -1.0 => -1,
                _ => {
                    return Err(StoreError::InvalidQuery(format!(
                        "sort direction for '{}' must be 1 or -1",
                        field
                    )))
                }
            };
            keys.push((field.clone(), dir));
        }
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The single sort field, if there is exactly one
    pub fn single(&self) -> Option<(&str, i32)> {
        match self.keys.as_slice() {
            [(field, dir)] => Some((field.as_str(), *dir)),
            _ => None,
        }
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, dir) in &self.keys {
            let ka = sort_key(a, field, *dir);
            let kb = sort_key(b, field, *dir);
            let ord = total_order(ka, kb);
            let ord = if *dir < 0 { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    pub fn apply(&self, documents: &mut [Document]) {
        if !self.is_empty() {
            documents.sort_by(|a, b| self.compare(a, b));
        }
    }
}

fn sort_key<'a>(document: &'a Document, field: &str, dir: i32) -> &'a Value {
    let mut flat = Vec::new();
    for value in resolve_path(document, field) {
        match value {
            Value::Array(items) if !items.is_empty() => flat.extend(items.iter()),
            other => flat.push(other),
        }
    }
    let pick = if dir < 0 {
        flat.into_iter().max_by(|a, b| total_order(a, b))
    } else {
        flat.into_iter().min_by(|a, b| total_order(a, b))
    };
    pick.unwrap_or(&NULL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d["n"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_parse_rejects_bad_directions() {
        assert!(SortSpec::parse(&doc(json!({"a": "asc"}))).is_err());
        assert!(SortSpec::parse(&doc(json!({"a": 0}))).is_err());
        assert_eq!(SortSpec::parse(&doc(json!({"a": -1}))).unwrap().single(), Some(("a", -1)));
    }

    #[test]
    fn test_multi_key_sort() {
        let mut docs = vec![
            doc(json!({"n": "a", "rating": 4, "precio": 10})),
            doc(json!({"n": "b", "rating": 5, "precio": 30})),
            doc(json!({"n": "c", "rating": 4, "precio": 5})),
        ];
        SortSpec::parse(&doc(json!({"rating": -1, "precio": 1})))
            .unwrap()
            .apply(&mut docs);
        assert_eq!(names(&docs), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_missing_fields_sort_first_ascending() {
        let mut docs = vec![
            doc(json!({"n": "a", "rating": 1})),
            doc(json!({"n": "b"})),
        ];
        SortSpec::parse(&doc(json!({"rating": 1}))).unwrap().apply(&mut docs);
        assert_eq!(names(&docs), vec!["b", "a"]);
    }

    #[test]
    fn test_array_fields_use_extreme_element() {
        let mut docs = vec![
            doc(json!({"n": "a", "s": [1, 9]})),
            doc(json!({"n": "b", "s": [5]})),
        ];
        SortSpec::parse(&doc(json!({"s": 1}))).unwrap().apply(&mut docs);
        assert_eq!(names(&docs), vec!["a", "b"]);
        SortSpec::parse(&doc(json!({"s": -1}))).unwrap().apply(&mut docs);
        assert_eq!(names(&docs), vec!["a", "b"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut docs = vec![
            doc(json!({"n": "first", "k": 1})),
            doc(json!({"n": "second", "k": 1})),
        ];
        SortSpec::parse(&doc(json!({"k": -1}))).unwrap().apply(&mut docs);
        assert_eq!(names(&docs), vec!["first", "second"]);
    }
}
