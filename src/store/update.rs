//! Update documents
//!
//! Only operator updates are supported: every top-level key must be an
//! update operator. Replacement-style updates are rejected.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::document::{get_path, get_path_mut, remove_path, root_segment, set_path, Document, ID_FIELD};
use super::errors::{StoreError, StoreResult};
use super::matcher::{conditions_match, parse_conditions, Condition};
use super::value::{total_order, values_equal};

/// One update operator with its per-field operands
#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set(Vec<(String, Value)>),
    Unset(Vec<String>),
    Inc(Vec<(String, Value)>),
    Mul(Vec<(String, Value)>),
    Min(Vec<(String, Value)>),
    Max(Vec<(String, Value)>),
    Rename(Vec<(String, String)>),
    Push(Vec<(String, Vec<Value>)>),
    AddToSet(Vec<(String, Vec<Value>)>),
    Pull(Vec<(String, PullCriterion)>),
}

/// What `$pull` removes from an array
#[derive(Debug, Clone)]
pub enum PullCriterion {
    Equal(Value),
    Matching(Vec<Condition>),
}

/// A parsed update document
#[derive(Debug, Clone)]
pub struct UpdateSpec {
    ops: Vec<UpdateOp>,
}

impl UpdateSpec {
    pub fn parse(update: &Document) -> StoreResult<Self> {
        if update.is_empty() {
            return Err(StoreError::InvalidUpdate("update document is empty".into()));
        }

        let mut ops = Vec::with_capacity(update.len());
        for (op, operand) in update {
            let fields = operand
                .as_object()
                .filter(|m| !m.is_empty())
                .ok_or_else(|| {
                    StoreError::InvalidUpdate(format!("'{}' needs a non-empty object", op))
                })?;

            for path in fields.keys() {
                if path.is_empty() || path.split('.').any(str::is_empty) || path.starts_with('$') {
                    return Err(StoreError::InvalidUpdate(format!(
                        "invalid field path '{}' in {}",
                        path, op
                    )));
                }
            }

            let parsed = match op.as_str() {
                "$set" => UpdateOp::Set(pairs(fields)),
                "$unset" => UpdateOp::Unset(fields.keys().cloned().collect()),
                "$inc" => UpdateOp::Inc(numeric_pairs(op, fields)?),
                "$mul" => UpdateOp::Mul(numeric_pairs(op, fields)?),
                "$min" => UpdateOp::Min(pairs(fields)),
                "$max" => UpdateOp::Max(pairs(fields)),
                "$rename" => {
                    let mut renames = Vec::with_capacity(fields.len());
                    for (from, to) in fields {
                        let to = to.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
                            StoreError::InvalidUpdate(format!(
                                "$rename target for '{}' must be a non-empty string",
                                from
                            ))
                        })?;
                        renames.push((from.clone(), to.to_string()));
                    }
                    UpdateOp::Rename(renames)
                }
                "$push" => UpdateOp::Push(each_pairs(fields)),
                "$addToSet" => UpdateOp::AddToSet(each_pairs(fields)),
                "$pull" => {
                    let mut criteria = Vec::with_capacity(fields.len());
                    for (path, operand) in fields {
                        let criterion = match operand {
                            Value::Object(map) if map.keys().all(|k| k.starts_with('$')) => {
                                PullCriterion::Matching(
                                    parse_conditions(map)
                                        .map_err(|e| StoreError::InvalidUpdate(e.to_string()))?,
                                )
                            }
                            other => PullCriterion::Equal(other.clone()),
                        };
                        criteria.push((path.clone(), criterion));
                    }
                    UpdateOp::Pull(criteria)
                }
                other => {
                    return Err(StoreError::InvalidUpdate(format!(
                        "unknown update operator: {}",
                        other
                    )))
                }
            };
            ops.push(parsed);
        }

        Ok(Self { ops })
    }

    /// Applies the update in place. Returns whether the document changed.
    pub fn apply(&self, document: &mut Document) -> StoreResult<bool> {
        let before = document.clone();
        for op in &self.ops {
            apply_op(op, document)?;
        }

        let id_before = before.get(ID_FIELD);
        let id_after = document.get(ID_FIELD);
        let id_kept = match (id_before, id_after) {
            (Some(a), Some(b)) => values_equal(a, b),
            (None, None) => true,
            _ => false,
        };
        if !id_kept {
            *document = before;
            return Err(StoreError::ImmutableField(ID_FIELD.to_string()));
        }

        Ok(!values_equal(&Value::Object(before), &Value::Object(document.clone())))
    }
}

fn pairs(fields: &Map<String, Value>) -> Vec<(String, Value)> {
    fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn numeric_pairs(op: &str, fields: &Map<String, Value>) -> StoreResult<Vec<(String, Value)>> {
    for (path, operand) in fields {
        if !operand.is_number() {
            return Err(StoreError::InvalidUpdate(format!(
                "cannot {} with non-numeric argument for '{}'",
                op, path
            )));
        }
    }
    Ok(pairs(fields))
}

/// Operand of `$push`/`$addToSet`: a single value or `{"$each": [...]}`
fn each_pairs(fields: &Map<String, Value>) -> Vec<(String, Vec<Value>)> {
    fields
        .iter()
        .map(|(path, operand)| {
            let values = match operand {
                Value::Object(map) if map.len() == 1 => match map.get("$each") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => vec![operand.clone()],
                },
                other => vec![other.clone()],
            };
            (path.clone(), values)
        })
        .collect()
}

fn apply_op(op: &UpdateOp, document: &mut Document) -> StoreResult<()> {
    match op {
        UpdateOp::Set(fields) => {
            for (path, value) in fields {
                set(document, path, value.clone())?;
            }
        }
        UpdateOp::Unset(paths) => {
            for path in paths {
                remove_path(document, path);
            }
        }
        UpdateOp::Inc(fields) => {
            for (path, delta) in fields {
                let next = match get_path(document, path) {
                    None => delta.clone(),
                    Some(current) => arithmetic(path, current, delta, Arith::Add)?,
                };
                set(document, path, next)?;
            }
        }
        UpdateOp::Mul(fields) => {
            for (path, factor) in fields {
                let next = match get_path(document, path) {
                    None => arithmetic(path, &Value::from(0), factor, Arith::Mul)?,
                    Some(current) => arithmetic(path, current, factor, Arith::Mul)?,
                };
                set(document, path, next)?;
            }
        }
        UpdateOp::Min(fields) => bound(document, fields, Ordering::Less)?,
        UpdateOp::Max(fields) => bound(document, fields, Ordering::Greater)?,
        UpdateOp::Rename(renames) => {
            for (from, to) in renames {
                if let Some(value) = remove_path(document, from) {
                    set(document, to, value)?;
                }
            }
        }
        UpdateOp::Push(fields) => {
            for (path, values) in fields {
                let items = array_at(document, path)?;
                items.extend(values.iter().cloned());
            }
        }
        UpdateOp::AddToSet(fields) => {
            for (path, values) in fields {
                let items = array_at(document, path)?;
                for value in values {
                    if !items.iter().any(|existing| values_equal(existing, value)) {
                        items.push(value.clone());
                    }
                }
            }
        }
        UpdateOp::Pull(fields) => {
            for (path, criterion) in fields {
                match get_path_mut(document, path) {
                    None => {}
                    Some(Value::Array(items)) => items.retain(|item| !criterion.removes(item)),
                    Some(_) => {
                        return Err(StoreError::InvalidUpdate(format!(
                            "cannot apply $pull to a non-array value at '{}'",
                            path
                        )))
                    }
                }
            }
        }
    }
    Ok(())
}

impl PullCriterion {
    fn removes(&self, item: &Value) -> bool {
        match self {
            PullCriterion::Equal(target) => values_equal(item, target),
            PullCriterion::Matching(conditions) => conditions_match(conditions, item),
        }
    }
}

fn set(document: &mut Document, path: &str, value: Value) -> StoreResult<()> {
    set_path(document, path, value).map_err(StoreError::InvalidUpdate)
}

fn bound(
    document: &mut Document,
    fields: &[(String, Value)],
    replace_when: Ordering,
) -> StoreResult<()> {
    for (path, candidate) in fields {
        let replace = match get_path(document, path) {
            None => true,
            Some(current) => total_order(candidate, current) == replace_when,
        };
        if replace {
            set(document, path, candidate.clone())?;
        }
    }
    Ok(())
}

/// Array at `path`, created empty when the field is missing
fn array_at<'a>(document: &'a mut Document, path: &str) -> StoreResult<&'a mut Vec<Value>> {
    if get_path(document, path).is_none() {
        set(document, path, Value::Array(Vec::new()))?;
    }
    match get_path_mut(document, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(StoreError::InvalidUpdate(format!(
            "the field '{}' must be an array",
            path
        ))),
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Mul,
}

fn arithmetic(path: &str, current: &Value, operand: &Value, op: Arith) -> StoreResult<Value> {
    let (Value::Number(a), Value::Number(b)) = (current, operand) else {
        return Err(StoreError::InvalidUpdate(format!(
            "cannot apply arithmetic to non-numeric field '{}'",
            root_segment(path)
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            Arith::Add => x.checked_add(y),
            Arith::Mul => x.checked_mul(y),
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }

    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    let result = match op {
        Arith::Add => x + y,
        Arith::Mul => x * y,
    };
    Ok(Value::from(result))
}
