//! Access path selection
//!
//! Rule-based and deterministic. For a given filter and index set the same
//! path is always chosen:
//!
//! 1. `_id` equality as the only predicate: primary key lookup
//! 2. Otherwise, among indexes whose leading field carries a usable
//!    predicate: equality beats `$in` beats range; then the longest run of
//!    constrained compound fields; then lexicographic index name
//! 3. A top-level `$or` where every branch has such an index: index union
//! 4. Otherwise a collection scan
//!
//! Index scans produce candidates only; the full filter is always
//! re-applied to fetched documents.

use std::ops::Bound;

use serde_json::Value;

use super::document::ID_FIELD;
use super::index::{IndexKey, IndexTree, Interval};
use super::matcher::{Condition, FilterExpr};

/// Chosen way to reach the documents
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    CollScan,
    /// Point lookup on the primary key index
    IdHack(IndexKey),
    IndexScan(IndexChoice),
    /// Union of one index scan per `$or` branch
    Union(Vec<IndexChoice>),
}

/// A single index with the intervals to walk on its leading field
#[derive(Debug, Clone, PartialEq)]
pub struct IndexChoice {
    /// Position of the index in the collection's index list
    pub index: usize,
    pub intervals: Vec<Interval>,
}

/// Strength of a predicate on an index's leading field; lower is better
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PredicateClass {
    Equality,
    Membership,
    Range,
}

/// Picks the access path for a filter
pub fn choose(filter: &FilterExpr, indexes: &[IndexTree]) -> AccessPath {
    let conjuncts = filter.conjuncts();

    if let Some(key) = id_point(&conjuncts) {
        return AccessPath::IdHack(key);
    }

    if let Some(choice) = best_index(&conjuncts, indexes) {
        return AccessPath::IndexScan(choice);
    }

    for clause in &conjuncts {
        if let FilterExpr::Or(branches) = clause {
            let choices: Option<Vec<IndexChoice>> = branches
                .iter()
                .map(|branch| best_index(&branch.conjuncts(), indexes))
                .collect();
            if let Some(choices) = choices {
                return AccessPath::Union(choices);
            }
        }
    }

    AccessPath::CollScan
}

/// `{_id: <scalar>}` with nothing else
fn id_point(conjuncts: &[&FilterExpr]) -> Option<IndexKey> {
    match conjuncts {
        [FilterExpr::Field { path, conditions }] if path == ID_FIELD => match conditions.as_slice() {
            [Condition::Eq(value)] if !value.is_array() && !value.is_null() => {
                IndexKey::from_value(value)
            }
            _ => None,
        },
        _ => None,
    }
}

fn field_conditions<'a>(conjuncts: &[&'a FilterExpr], field: &str) -> Vec<&'a Condition> {
    conjuncts
        .iter()
        .copied()
        .filter_map(|clause| match clause {
            FilterExpr::Field { path, conditions } if path == field => Some(conditions),
            _ => None,
        })
        .flatten()
        .collect()
}

fn best_index(conjuncts: &[&FilterExpr], indexes: &[IndexTree]) -> Option<IndexChoice> {
    let mut best: Option<((PredicateClass, std::cmp::Reverse<usize>, &str), IndexChoice)> = None;

    for (position, tree) in indexes.iter().enumerate() {
        let leading = field_conditions(conjuncts, tree.spec.leading_field());
        let Some((class, intervals)) = intervals_for(&leading, tree.spec.sparse) else {
            continue;
        };

        let prefix = tree
            .spec
            .fields()
            .take_while(|f| !field_conditions(conjuncts, f).is_empty())
            .count();
        let rank = (class, std::cmp::Reverse(prefix), tree.spec.name.as_str());

        if best.as_ref().map_or(true, |(current, _)| rank < *current) {
            best = Some((
                rank,
                IndexChoice {
                    index: position,
                    intervals,
                },
            ));
        }
    }

    best.map(|(_, choice)| choice)
}

fn sargable_key(value: &Value) -> Option<IndexKey> {
    if value.is_array() {
        return None;
    }
    IndexKey::from_value(value)
}

/// Intervals over the leading field implied by its conditions
fn intervals_for(conditions: &[&Condition], sparse: bool) -> Option<(PredicateClass, Vec<Interval>)> {
    for condition in conditions {
        if let Condition::Eq(value) = condition {
            if sparse && value.is_null() {
                continue;
            }
            if let Some(key) = sargable_key(value) {
                return Some((PredicateClass::Equality, vec![Interval::point(key)]));
            }
        }
    }

    for condition in conditions {
        if let Condition::In(values) = condition {
            if sparse && values.iter().any(Value::is_null) {
                continue;
            }
            let keys: Option<Vec<IndexKey>> = values.iter().map(sargable_key).collect();
            if let Some(mut keys) = keys {
                keys.sort();
                keys.dedup();
                let points = keys.into_iter().map(Interval::point).collect();
                return Some((PredicateClass::Membership, points));
            }
        }
    }

    let mut lower: Bound<IndexKey> = Bound::Unbounded;
    let mut upper: Bound<IndexKey> = Bound::Unbounded;
    for condition in conditions {
        match condition {
            Condition::Gt(v) => tighten_lower(&mut lower, sargable_key(v), false),
            Condition::Gte(v) => tighten_lower(&mut lower, sargable_key(v), true),
            Condition::Lt(v) => tighten_upper(&mut upper, sargable_key(v), false),
            Condition::Lte(v) => tighten_upper(&mut upper, sargable_key(v), true),
            _ => {}
        }
    }

    let interval = match (lower, upper) {
        (Bound::Unbounded, Bound::Unbounded) => return None,
        (Bound::Unbounded, upper) => {
            let floor = match &upper {
                Bound::Included(k) | Bound::Excluded(k) => k.bracket_min(),
                Bound::Unbounded => IndexKey::Null,
            };
            Interval {
                lower: Bound::Included(floor),
                upper,
            }
        }
        (lower, Bound::Unbounded) => {
            let ceiling = match &lower {
                Bound::Included(k) | Bound::Excluded(k) => k.bracket_max(),
                Bound::Unbounded => Bound::Unbounded,
            };
            Interval {
                lower,
                upper: ceiling,
            }
        }
        (lower, upper) => Interval { lower, upper },
    };
    Some((PredicateClass::Range, vec![interval]))
}

fn tighten_lower(bound: &mut Bound<IndexKey>, key: Option<IndexKey>, inclusive: bool) {
    let Some(key) = key else { return };
    let candidate = if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    };
    let replace = match (&*bound, &candidate) {
        (Bound::Unbounded, _) => true,
        (Bound::Included(cur) | Bound::Excluded(cur), Bound::Included(new) | Bound::Excluded(new)) => {
            new > cur || (new == cur && matches!(candidate, Bound::Excluded(_)))
        }
        _ => false,
    };
    if replace {
        *bound = candidate;
    }
}

fn tighten_upper(bound: &mut Bound<IndexKey>, key: Option<IndexKey>, inclusive: bool) {
    let Some(key) = key else { return };
    let candidate = if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    };
    let replace = match (&*bound, &candidate) {
        (Bound::Unbounded, _) => true,
        (Bound::Included(cur) | Bound::Excluded(cur), Bound::Included(new) | Bound::Excluded(new)) => {
            new < cur || (new == cur && matches!(candidate, Bound::Excluded(_)))
        }
        _ => false,
    };
    if replace {
        *bound = candidate;
    }
}
