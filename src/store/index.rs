//! Declared indexes
//!
//! Each index is a `BTreeMap` from a compound key to the set of record ids
//! carrying it. Keys order deterministically across types, so range scans
//! over the leading field are plain `BTreeMap` range walks.
//!
//! Array values make an index multikey: one entry per element.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::document::{resolve_path, Document, ID_FIELD};
use super::errors::{StoreError, StoreResult};

/// Stable identity of a stored record
pub type RecordId = u64;

/// Name of the implicit primary key index
pub const ID_INDEX_NAME: &str = "_id_";

/// Index key for a single field value.
///
/// Variant order is the sort order: null < numbers < strings < objects < bools.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// Missing or null
    Null,
    /// Numeric value as order-preserving float bits. Integers past 2^53
    /// can share a key; the full filter is re-applied after the scan.
    Number(u64),
    String(String),
    /// Object values keyed by their canonical JSON text
    Object(String),
    Bool(bool),
}

impl IndexKey {
    /// Order-preserving key for a float
    pub fn from_f64(v: f64) -> Self {
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Number(ordered)
    }

    /// Key for a scalar or object value; arrays have no single key
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => n.as_f64().map(IndexKey::from_f64),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Object(_) => Some(IndexKey::Object(value.to_string())),
            Value::Array(_) => None,
        }
    }

    /// Smallest key of the same type bracket
    pub fn bracket_min(&self) -> IndexKey {
        match self {
            IndexKey::Null => IndexKey::Null,
            IndexKey::Number(_) => IndexKey::from_f64(f64::NEG_INFINITY),
            IndexKey::String(_) => IndexKey::String(String::new()),
            IndexKey::Object(_) => IndexKey::Object(String::new()),
            IndexKey::Bool(_) => IndexKey::Bool(false),
        }
    }

    /// Largest key of the same type bracket
    pub fn bracket_max(&self) -> Bound<IndexKey> {
        match self {
            IndexKey::Null => Bound::Included(IndexKey::Null),
            IndexKey::Number(_) => Bound::Included(IndexKey::from_f64(f64::INFINITY)),
            IndexKey::String(_) => Bound::Excluded(IndexKey::Object(String::new())),
            IndexKey::Object(_) => Bound::Excluded(IndexKey::Bool(false)),
            IndexKey::Bool(_) => Bound::Included(IndexKey::Bool(true)),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => write!(f, "null"),
            IndexKey::Number(bits) => {
                let raw = if (bits >> 63) == 1 {
                    bits ^ (1 << 63)
                } else {
                    !bits
                };
                write!(f, "{}", f64::from_bits(raw))
            }
            IndexKey::String(s) => write!(f, "\"{}\"", s),
            IndexKey::Object(s) => write!(f, "{}", s),
            IndexKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A contiguous range over the leading index field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl Interval {
    /// Single-key interval `[k, k]`
    pub fn point(key: IndexKey) -> Self {
        Self {
            lower: Bound::Included(key.clone()),
            upper: Bound::Included(key),
        }
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Included(k) => key >= k,
            Bound::Excluded(k) => key > k,
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(k) => key <= k,
            Bound::Excluded(k) => key < k,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// Explain rendering, e.g. `[5, inf]` or `("a", "m")`
    pub fn describe(&self) -> String {
        let (open, low) = match &self.lower {
            Bound::Included(k) => ('[', k.to_string()),
            Bound::Excluded(k) => ('(', k.to_string()),
            Bound::Unbounded => ('[', "MinKey".to_string()),
        };
        let (high, close) = match &self.upper {
            Bound::Included(k) => (k.to_string(), ']'),
            Bound::Excluded(k) => (k.to_string(), ')'),
            Bound::Unbounded => ("MaxKey".to_string(), ']'),
        };
        format!("{}{}, {}{}", open, low, high, close)
    }
}

/// Options accepted when declaring an index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IndexOptions {
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Recorded with the index; expiry itself is not enforced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

/// Definition of one index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    /// Ordered `(field, direction)` pairs; direction is 1 or -1
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
    pub sparse: bool,
    pub expire_after_seconds: Option<u64>,
}

impl IndexSpec {
    /// Validates a key pattern and options into a spec
    pub fn new(pattern: &Document, options: IndexOptions) -> StoreResult<Self> {
        if pattern.is_empty() {
            return Err(StoreError::InvalidIndex(
                "index key pattern must name at least one field".into(),
            ));
        }

        let mut keys = Vec::with_capacity(pattern.len());
        for (field, direction) in pattern {
            if field.is_empty() || field.starts_with('$') || field.split('.').any(str::is_empty) {
                return Err(StoreError::InvalidIndex(format!(
                    "invalid index field name '{}'",
                    field
                )));
            }
            let dir = match direction.as_i64() {
                Some(1) => 1,
                Some(-1) => -1,
                _ => {
                    return Err(StoreError::InvalidIndex(format!(
                        "direction for '{}' must be 1 or -1, got {}",
                        field, direction
                    )))
                }
            };
            keys.push((field.clone(), dir));
        }

        let name = match options.name {
            Some(name) if name.is_empty() => {
                return Err(StoreError::InvalidIndex("index name must not be empty".into()))
            }
            Some(name) => name,
            None => default_index_name(&keys),
        };

        Ok(Self {
            name,
            keys,
            unique: options.unique,
            sparse: options.sparse,
            expire_after_seconds: options.expire_after_seconds,
        })
    }

    /// The implicit unique index on `_id`
    pub fn primary() -> Self {
        Self {
            name: ID_INDEX_NAME.to_string(),
            keys: vec![(ID_FIELD.to_string(), 1)],
            unique: true,
            sparse: false,
            expire_after_seconds: None,
        }
    }

    pub fn leading_field(&self) -> &str {
        &self.keys[0].0
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(f, _)| f.as_str())
    }

    /// Key pattern document, e.g. `{"nombre": 1, "rating": -1}`
    pub fn key_pattern(&self) -> Value {
        let pattern: Map<String, Value> = self
            .keys
            .iter()
            .map(|(f, d)| (f.clone(), json!(d)))
            .collect();
        Value::Object(pattern)
    }

    /// Listing form returned by `list_indexes`
    pub fn to_value(&self) -> Value {
        let mut out = json!({
            "v": 2,
            "key": self.key_pattern(),
            "name": self.name,
        });
        if let Some(map) = out.as_object_mut() {
            if self.unique {
                map.insert("unique".into(), json!(true));
            }
            if self.sparse {
                map.insert("sparse".into(), json!(true));
            }
            if let Some(ttl) = self.expire_after_seconds {
                map.insert("expireAfterSeconds".into(), json!(ttl));
            }
        }
        out
    }

    /// Every compound key a document contributes.
    ///
    /// Returns an empty list for a sparse index when the document has none
    /// of the indexed fields. The flag reports whether an array was expanded.
    pub fn keys_for(&self, document: &Document) -> (Vec<Vec<IndexKey>>, bool) {
        let mut multikey = false;
        let mut any_present = false;
        let mut per_field: Vec<Vec<IndexKey>> = Vec::with_capacity(self.keys.len());

        for (field, _) in &self.keys {
            let mut keys = Vec::new();
            for value in resolve_path(document, field) {
                any_present = true;
                match value {
                    Value::Array(items) => {
                        multikey = true;
                        if items.is_empty() {
                            keys.push(IndexKey::Null);
                        }
                        keys.extend(items.iter().filter_map(IndexKey::from_value));
                    }
                    other => keys.extend(IndexKey::from_value(other)),
                }
            }
            if keys.is_empty() {
                keys.push(IndexKey::Null);
            }
            keys.sort();
            keys.dedup();
            per_field.push(keys);
        }

        if self.sparse && !any_present {
            return (Vec::new(), multikey);
        }

        let mut combos: Vec<Vec<IndexKey>> = vec![Vec::new()];
        for keys in per_field {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    keys.iter().map(move |k| {
                        let mut next = prefix.clone();
                        next.push(k.clone());
                        next
                    })
                })
                .collect();
        }
        (combos, multikey)
    }
}

fn default_index_name(keys: &[(String, i32)]) -> String {
    keys.iter()
        .map(|(f, d)| format!("{}_{}", f, d))
        .collect::<Vec<_>>()
        .join("_")
}

/// An index definition with its entries
#[derive(Debug, Clone)]
pub struct IndexTree {
    pub spec: IndexSpec,
    entries: BTreeMap<Vec<IndexKey>, BTreeSet<RecordId>>,
    multikey: bool,
}

impl IndexTree {
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
            multikey: false,
        }
    }

    pub fn is_multikey(&self) -> bool {
        self.multikey
    }

    /// First key this document would collide on, for unique indexes
    pub fn conflict(&self, document: &Document, own: Option<RecordId>) -> Option<Vec<IndexKey>> {
        if !self.spec.unique {
            return None;
        }
        let (keys, _) = self.spec.keys_for(document);
        keys.into_iter().find(|key| {
            self.entries
                .get(key)
                .is_some_and(|ids| ids.iter().any(|id| Some(*id) != own))
        })
    }

    pub fn insert(&mut self, record: RecordId, document: &Document) {
        let (keys, multikey) = self.spec.keys_for(document);
        self.multikey |= multikey;
        for key in keys {
            self.entries.entry(key).or_default().insert(record);
        }
    }

    pub fn remove(&mut self, record: RecordId, document: &Document) {
        let (keys, _) = self.spec.keys_for(document);
        for key in keys {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&record);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Walks the intervals over the leading field.
    ///
    /// Returns record ids in key order without duplicates, and the number of
    /// index keys examined.
    pub fn scan(&self, intervals: &[Interval]) -> (Vec<RecordId>, u64) {
        let mut seen = BTreeSet::new();
        let mut records = Vec::new();
        let mut keys_examined = 0u64;

        for interval in intervals {
            let start = match &interval.lower {
                Bound::Included(k) | Bound::Excluded(k) => Bound::Included(vec![k.clone()]),
                Bound::Unbounded => Bound::Unbounded,
            };
            for (key, ids) in self.entries.range((start, Bound::Unbounded)) {
                let leading = &key[0];
                if !interval.contains(leading) {
                    let past_upper = match &interval.upper {
                        Bound::Included(u) => leading > u,
                        Bound::Excluded(u) => leading >= u,
                        Bound::Unbounded => false,
                    };
                    if past_upper {
                        break;
                    }
                    continue;
                }
                keys_examined += 1;
                for id in ids {
                    if seen.insert(*id) {
                        records.push(*id);
                    }
                }
            }
        }
        (records, keys_examined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl IndexTree {
        fn key_count(&self) -> usize {
            self.entries.len()
        }
    }

    #[test]
    fn test_large_integers_may_share_a_key() {
        let a = IndexKey::from_value(&json!(9_007_199_254_740_992_u64));
        let b = IndexKey::from_value(&json!(9_007_199_254_740_993_u64));
        assert_eq!(a, b);
        assert!(IndexKey::from_value(&json!(1)) < IndexKey::from_value(&json!(2)));
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn spec(pattern: Value) -> IndexSpec {
        IndexSpec::new(&doc(pattern), IndexOptions::default()).unwrap()
    }

    #[test]
    fn test_key_ordering() {
        let keys = vec![
            IndexKey::Null,
            IndexKey::from_f64(-100.0),
            IndexKey::from_f64(0.0),
            IndexKey::from_f64(2.5),
            IndexKey::String("aaa".into()),
            IndexKey::String("zzz".into()),
            IndexKey::Object("{}".into()),
            IndexKey::Bool(false),
            IndexKey::Bool(true),
        ];
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{:?} < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_number_display_round_trips() {
        assert_eq!(IndexKey::from_f64(-3.5).to_string(), "-3.5");
        assert_eq!(IndexKey::from_f64(42.0).to_string(), "42");
    }

    #[test]
    fn test_default_names() {
        assert_eq!(spec(json!({"nombre": 1})).name, "nombre_1");
        assert_eq!(
            spec(json!({"id_usuario": 1, "estado": -1})).name,
            "id_usuario_1_estado_-1"
        );
    }

    #[test]
    fn test_rejects_bad_patterns() {
        assert!(IndexSpec::new(&doc(json!({})), IndexOptions::default()).is_err());
        assert!(IndexSpec::new(&doc(json!({"a": "text"})), IndexOptions::default()).is_err());
        assert!(IndexSpec::new(&doc(json!({"a": 2})), IndexOptions::default()).is_err());
        assert!(IndexSpec::new(&doc(json!({"$a": 1})), IndexOptions::default()).is_err());
    }

    #[test]
    fn test_options_reject_unknown_keys() {
        let parsed: Result<IndexOptions, _> = serde_json::from_value(json!({"collation": {}}));
        assert!(parsed.is_err());

        let parsed: IndexOptions =
            serde_json::from_value(json!({"unique": true, "expireAfterSeconds": 60})).unwrap();
        assert!(parsed.unique);
        assert_eq!(parsed.expire_after_seconds, Some(60));
    }

    #[test]
    fn test_multikey_expansion() {
        let s = spec(json!({"categorias": 1}));
        let (keys, multikey) = s.keys_for(&doc(json!({"categorias": ["Postres", "Bebidas"]})));
        assert!(multikey);
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_missing_field_indexes_as_null_unless_sparse() {
        let dense = spec(json!({"rating": 1}));
        let (keys, _) = dense.keys_for(&doc(json!({"nombre": "x"})));
        assert_eq!(keys, vec![vec![IndexKey::Null]]);

        let sparse = IndexSpec::new(
            &doc(json!({"rating": 1})),
            IndexOptions {
                sparse: true,
                ..Default::default()
            },
        )
        .unwrap();
        let (keys, _) = sparse.keys_for(&doc(json!({"nombre": "x"})));
        assert!(keys.is_empty());
    }

    #[test]
    fn test_range_scan_over_leading_field() {
        let mut tree = IndexTree::new(spec(json!({"rating": 1, "nombre": 1})));
        for (id, rating) in [(1, 5), (2, 3), (3, 4), (4, 1)] {
            tree.insert(id, &doc(json!({"rating": rating, "nombre": format!("r{}", id)})));
        }

        let interval = Interval {
            lower: Bound::Included(IndexKey::from_f64(3.0)),
            upper: Bound::Included(IndexKey::from_f64(f64::INFINITY)),
        };
        let (records, examined) = tree.scan(&[interval]);
        assert_eq!(records, vec![2, 3, 1]);
        assert_eq!(examined, 3);
    }

    #[test]
    fn test_exclusive_lower_bound_skips_equal_keys() {
        let mut tree = IndexTree::new(spec(json!({"n": 1})));
        for id in 0..5u64 {
            tree.insert(id, &doc(json!({"n": id})));
        }
        let interval = Interval {
            lower: Bound::Excluded(IndexKey::from_f64(2.0)),
            upper: Bound::Excluded(IndexKey::from_f64(4.0)),
        };
        let (records, _) = tree.scan(&[interval]);
        assert_eq!(records, vec![3]);
    }

    #[test]
    fn test_unique_conflict_ignores_own_record() {
        let mut tree = IndexTree::new(IndexSpec::primary());
        let d = doc(json!({"_id": 1}));
        tree.insert(7, &d);
        assert!(tree.conflict(&d, Some(7)).is_none());
        assert!(tree.conflict(&d, None).is_some());
    }

    #[test]
    fn test_remove_drops_empty_keys() {
        let mut tree = IndexTree::new(spec(json!({"a": 1})));
        let d = doc(json!({"a": 1}));
        tree.insert(1, &d);
        assert_eq!(tree.key_count(), 1);
        tree.remove(1, &d);
        assert_eq!(tree.key_count(), 0);
    }

    #[test]
    fn test_interval_describe() {
        assert_eq!(Interval::point(IndexKey::from_f64(5.0)).describe(), "[5, 5]");
        let open = Interval {
            lower: Bound::Excluded(IndexKey::String("a".into())),
            upper: Bound::Unbounded,
        };
        assert_eq!(open.describe(), "(\"a\", MaxKey]");
    }
}
