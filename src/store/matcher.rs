//! Filter documents
//!
//! A filter is parsed once into a `FilterExpr` tree and then evaluated per
//! document. Field predicates resolve dotted paths with array fan-out, so a
//! predicate on an array field matches when any element satisfies it.

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use super::document::{is_extended_literal, resolve_path, Document};
use super::errors::{StoreError, StoreResult};
use super::value::{compare_same_type, values_equal};

/// A parsed filter
#[derive(Debug, Clone)]
pub enum FilterExpr {
    /// Every child must match; a parsed top-level document is an `And`
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Nor(Vec<FilterExpr>),
    /// Conditions on one dotted path, all of which must hold
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
}

/// A single operator applied to the values found at a path
#[derive(Debug, Clone)]
pub enum Condition {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    All(Vec<Value>),
    ElemMatch(ElemMatch),
    Not(Vec<Condition>),
}

/// Body of an `$elemMatch`
#[derive(Debug, Clone)]
pub enum ElemMatch {
    /// Operators applied to each element directly, e.g. `{"$gte": 80}`
    Value(Vec<Condition>),
    /// A sub-filter applied to object elements
    Document(Box<FilterExpr>),
}

impl FilterExpr {
    /// Parses a filter document
    pub fn parse(filter: &Document) -> StoreResult<Self> {
        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            clauses.push(parse_clause(key, value)?);
        }
        Ok(FilterExpr::And(clauses))
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            FilterExpr::And(children) => children.iter().all(|c| c.matches(document)),
            FilterExpr::Or(children) => children.iter().any(|c| c.matches(document)),
            FilterExpr::Nor(children) => !children.iter().any(|c| c.matches(document)),
            FilterExpr::Field { path, conditions } => {
                let values = resolve_path(document, path);
                conditions.iter().all(|c| c.holds(&values))
            }
        }
    }

    /// Field clauses reachable through nested `$and`s
    pub fn conjuncts(&self) -> Vec<&FilterExpr> {
        match self {
            FilterExpr::And(children) => children.iter().flat_map(FilterExpr::conjuncts).collect(),
            other => vec![other],
        }
    }
}

fn parse_clause(key: &str, value: &Value) -> StoreResult<FilterExpr> {
    match key {
        "$and" => Ok(FilterExpr::And(parse_branches(key, value)?)),
        "$or" => Ok(FilterExpr::Or(parse_branches(key, value)?)),
        "$nor" => Ok(FilterExpr::Nor(parse_branches(key, value)?)),
        k if k.starts_with('$') => Err(StoreError::InvalidQuery(format!(
            "unknown top level operator: {}",
            k
        ))),
        path => Ok(FilterExpr::Field {
            path: path.to_string(),
            conditions: parse_field_value(value)?,
        }),
    }
}

fn parse_branches(op: &str, value: &Value) -> StoreResult<Vec<FilterExpr>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} must be a nonempty array", op)))?;

    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => FilterExpr::parse(map),
            _ => Err(StoreError::InvalidQuery(format!(
                "{} argument's entries must be objects",
                op
            ))),
        })
        .collect()
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !is_extended_literal(map) && map.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_field_value(value: &Value) -> StoreResult<Vec<Condition>> {
    match value {
        Value::Object(map) if is_operator_object(map) => parse_conditions(map),
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

/// Parses an operator object such as `{"$gte": 3, "$lt": 5}`
pub fn parse_conditions(map: &Map<String, Value>) -> StoreResult<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(map.len());
    let options = map.get("$options").and_then(Value::as_str);
    if map.contains_key("$options") && !map.contains_key("$regex") {
        return Err(StoreError::InvalidQuery("$options needs a $regex".into()));
    }

    for (op, operand) in map {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" => Condition::In(array_operand(op, operand)?),
            "$nin" => Condition::Nin(array_operand(op, operand)?),
            "$all" => Condition::All(array_operand(op, operand)?),
            "$exists" => Condition::Exists(truthy(operand)),
            "$size" => match operand.as_u64() {
                Some(n) => Condition::Size(n as usize),
                None => {
                    return Err(StoreError::InvalidQuery(
                        "$size needs a non-negative integer".into(),
                    ))
                }
            },
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| StoreError::InvalidQuery("$regex has to be a string".into()))?;
                Condition::Regex(build_regex(pattern, options.unwrap_or(""))?)
            }
            "$options" => continue,
            "$elemMatch" => match operand {
                Value::Object(inner) if is_operator_object(inner) => {
                    Condition::ElemMatch(ElemMatch::Value(parse_conditions(inner)?))
                }
                Value::Object(inner) => {
                    Condition::ElemMatch(ElemMatch::Document(Box::new(FilterExpr::parse(inner)?)))
                }
                _ => return Err(StoreError::InvalidQuery("$elemMatch needs an Object".into())),
            },
            "$not" => match operand {
                Value::Object(inner) if is_operator_object(inner) => {
                    Condition::Not(parse_conditions(inner)?)
                }
                _ => return Err(StoreError::InvalidQuery("$not needs an operator object".into())),
            },
            other => {
                return Err(StoreError::InvalidQuery(format!("unknown operator: {}", other)))
            }
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

fn array_operand(op: &str, operand: &Value) -> StoreResult<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs an array", op)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Null => false,
        _ => true,
    }
}

fn build_regex(pattern: &str, options: &str) -> StoreResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid flag in regex options: {}",
                    other
                )))
            }
        };
    }
    builder
        .build()
        .map_err(|e| StoreError::InvalidQuery(format!("invalid regular expression: {}", e)))
}

/// Each value found at the path, plus the elements of any arrays among them
fn candidates<'a>(values: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        out.push(*value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

fn equality_holds(values: &[&Value], target: &Value) -> bool {
    if target.is_null() && values.is_empty() {
        return true;
    }
    candidates(values).iter().any(|v| values_equal(v, target))
}

fn range_holds(values: &[&Value], target: &Value, accept: fn(Ordering) -> bool) -> bool {
    candidates(values)
        .iter()
        .any(|v| compare_same_type(v, target).is_some_and(accept))
}

impl Condition {
    /// Evaluates against every value found at a path
    pub fn holds(&self, values: &[&Value]) -> bool {
        match self {
            Condition::Eq(target) => equality_holds(values, target),
            Condition::Ne(target) => !equality_holds(values, target),
            Condition::Gt(target) => range_holds(values, target, Ordering::is_gt),
            Condition::Gte(target) => range_holds(values, target, Ordering::is_ge),
            Condition::Lt(target) => range_holds(values, target, Ordering::is_lt),
            Condition::Lte(target) => range_holds(values, target, Ordering::is_le),
            Condition::In(options) => options.iter().any(|o| equality_holds(values, o)),
            Condition::Nin(options) => !options.iter().any(|o| equality_holds(values, o)),
            Condition::Exists(expected) => !values.is_empty() == *expected,
            Condition::Regex(re) => candidates(values)
                .iter()
                .any(|v| v.as_str().is_some_and(|s| re.is_match(s))),
            Condition::Size(n) => values
                .iter()
                .any(|v| v.as_array().is_some_and(|items| items.len() == *n)),
            Condition::All(required) => {
                !required.is_empty() && required.iter().all(|r| equality_holds(values, r))
            }
            Condition::ElemMatch(body) => values.iter().any(|v| match v {
                Value::Array(items) => items.iter().any(|item| body.accepts(item)),
                _ => false,
            }),
            Condition::Not(inner) => !inner.iter().all(|c| c.holds(values)),
        }
    }
}

impl ElemMatch {
    fn accepts(&self, element: &Value) -> bool {
        match self {
            ElemMatch::Value(conditions) => conditions.iter().all(|c| c.holds(&[element])),
            ElemMatch::Document(filter) => element.as_object().is_some_and(|m| filter.matches(m)),
        }
    }
}

/// True when every condition holds for a single standalone value
pub fn conditions_match(conditions: &[Condition], value: &Value) -> bool {
    conditions.iter().all(|c| c.holds(&[value]))
}
