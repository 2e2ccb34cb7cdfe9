//! Documents, identifiers and dotted-path access

use std::fmt;

use bson::oid::ObjectId;
use serde_json::{json, Map, Value};

/// A stored document: an ordered JSON object
pub type Document = Map<String, Value>;

/// Name of the primary key field
pub const ID_FIELD: &str = "_id";

/// Extended-JSON key carrying an object identifier
pub const OID_KEY: &str = "$oid";

/// Extended-JSON key carrying a date
pub const DATE_KEY: &str = "$date";

/// A 12-byte object identifier (24 hex digits on the wire).
///
/// Its typed JSON form is `{"$oid": "<hex>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(ObjectId);

impl DocumentId {
    /// Generates a fresh identifier
    pub fn generate() -> Self {
        Self(ObjectId::new())
    }

    /// Parses the canonical 24-hex-digit encoding
    pub fn parse(raw: &str) -> Result<Self, bson::oid::Error> {
        ObjectId::parse_str(raw).map(Self)
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Typed JSON form
    pub fn to_value(&self) -> Value {
        json!({ OID_KEY: self.to_hex() })
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Returns true for extended-JSON literals such as `{"$oid": ...}`.
///
/// These look like operator objects but compare as plain values.
pub fn is_extended_literal(map: &Map<String, Value>) -> bool {
    map.len() == 1 && (map.contains_key(OID_KEY) || map.contains_key(DATE_KEY))
}

/// Resolves a dotted path with array fan-out.
///
/// `a.b` against `{"a": [{"b": 1}, {"b": 2}]}` yields both `1` and `2`.
/// Numeric segments index into arrays. Missing paths yield nothing.
pub fn resolve_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let mut segments = path.split('.');
    let first = match segments.next().and_then(|s| document.get(s)) {
        Some(v) => v,
        None => return Vec::new(),
    };

    let mut current = vec![first];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(segment) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    if let Ok(idx) = segment.parse::<usize>() {
                        if let Some(child) = items.get(idx) {
                            next.push(child);
                        }
                    } else {
                        for item in items {
                            if let Some(child) = item.as_object().and_then(|m| m.get(segment)) {
                                next.push(child);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Reads a dotted path without array fan-out
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes a dotted path, creating intermediate objects.
///
/// Fails if an intermediate segment holds a non-container value.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Err("empty path".into()),
    };

    let mut current = document;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(format!(
                    "cannot create field '{}' inside non-object '{}'",
                    last, segment
                ))
            }
        };
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// Mutable access to a dotted path, if every segment exists
pub fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let mut current = document.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Removes a dotted path, returning the removed value
pub fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => document.shift_remove(path),
        Some((parent, last)) => match get_path_mut(document, parent)? {
            Value::Object(map) => map.shift_remove(last),
            _ => None,
        },
    }
}

/// Checks a collection name: non-empty, no `$` or NUL, not a `system.` name
pub fn validate_collection_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("collection name must not be empty".into());
    }
    if name.contains('$') {
        return Err(format!("collection name '{}' must not contain '$'", name));
    }
    if name.contains('\0') {
        return Err("collection name must not contain a null character".into());
    }
    if name.starts_with("system.") {
        return Err(format!("collection name '{}' is reserved", name));
    }
    Ok(())
}

/// Top-level segment of a dotted path
pub fn root_segment(path: &str) -> &str {
    path.split('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_document_id_round_trip() {
        let id = DocumentId::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(id.to_value(), json!({"$oid": "507f1f77bcf86cd799439011"}));
    }

    #[test]
    fn test_document_id_rejects_garbage() {
        assert!(DocumentId::parse("not-an-id").is_err());
        assert!(DocumentId::parse("507f1f77bcf86cd79943901").is_err());
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(DocumentId::generate(), DocumentId::generate());
    }

    #[test]
    fn test_resolve_path_fans_out_over_arrays() {
        let d = doc(json!({"items": [{"qty": 1}, {"qty": 5}, {"other": 2}]}));
        let values = resolve_path(&d, "items.qty");
        assert_eq!(values, vec![&json!(1), &json!(5)]);
    }

    #[test]
    fn test_resolve_path_numeric_segment() {
        let d = doc(json!({"tags": ["a", "b"]}));
        assert_eq!(resolve_path(&d, "tags.1"), vec![&json!("b")]);
        assert!(resolve_path(&d, "tags.7").is_empty());
    }

    #[test]
    fn test_get_and_set_nested() {
        let mut d = doc(json!({"a": {"b": 1}}));
        set_path(&mut d, "a.c.d", json!(true)).unwrap();
        assert_eq!(get_path(&d, "a.c.d"), Some(&json!(true)));
        assert_eq!(get_path(&d, "a.b"), Some(&json!(1)));
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut d = doc(json!({"a": 5}));
        assert!(set_path(&mut d, "a.b", json!(1)).is_err());
    }

    #[test]
    fn test_remove_nested() {
        let mut d = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(remove_path(&mut d, "a.b"), Some(json!(1)));
        assert_eq!(d, doc(json!({"a": {"c": 2}})));
        assert_eq!(remove_path(&mut d, "missing.x"), None);
    }

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("restaurantes").is_ok());
        assert!(validate_collection_name("menu.items").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a$b").is_err());
        assert!(validate_collection_name("a\0b").is_err());
        assert!(validate_collection_name("system.users").is_err());
    }

    #[test]
    fn test_extended_literal() {
        let oid = json!({"$oid": "507f1f77bcf86cd799439011"});
        assert!(is_extended_literal(oid.as_object().unwrap()));
        let op = json!({"$gt": 1});
        assert!(!is_extended_literal(op.as_object().unwrap()));
    }
}
