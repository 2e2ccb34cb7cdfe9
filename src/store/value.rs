//! Value equality and ordering
//!
//! Type brackets follow the document-database convention:
//! null < numbers < strings < objects < arrays < booleans.
//! Numbers compare numerically regardless of integer/float encoding.

use std::cmp::Ordering;

use serde_json::Value;

/// Sort bracket of a value
pub fn type_bracket(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Equality with numeric normalization (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xf), Some(yf)) => xf == yf,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .zip(ym)
                    .all(|((xk, xv), (yk, yv))| xk == yk && values_equal(xv, yv))
        }
        _ => a == b,
    }
}

/// Ordering between two values of the same bracket.
///
/// Returns `None` when the brackets differ; range operators never match
/// across types.
pub fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    if type_bracket(a) != type_bracket(b) {
        return None;
    }
    Some(total_order(a, b))
}

/// Total order across all values, used for sorting
pub fn total_order(a: &Value, b: &Value) -> Ordering {
    let bracket = type_bracket(a).cmp(&type_bracket(b));
    if bracket != Ordering::Equal {
        return bracket;
    }

    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let xf = x.as_f64().unwrap_or(0.0);
            let yf = y.as_f64().unwrap_or(0.0);
            xf.partial_cmp(&yf).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(xs), Value::Array(ys)) => {
            for (x, y) in xs.iter().zip(ys) {
                let ord = total_order(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (Value::Object(xm), Value::Object(ym)) => {
            for ((xk, xv), (yk, yv)) in xm.iter().zip(ym) {
                let ord = xk.cmp(yk).then_with(|| total_order(xv, yv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xm.len().cmp(&ym.len())
        }
        _ => Ordering::Equal,
    }
}
