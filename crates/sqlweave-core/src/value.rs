//! Runtime parameter values
//!
//! Parameters are opaque `serde_json::Value`s; the renderer only needs the
//! null / boolean / numeric / string / collection classification. Structured
//! parameters are nested JSON objects, so dotted paths resolve without any
//! runtime reflection.

use serde_json::Value;
use std::collections::HashMap;

/// Named runtime parameters for a single statement build.
///
/// A key that is absent is distinct from a key that is present with a
/// `Value::Null`; null checks in conditions care about the difference.
pub type ParamMap = HashMap<String, Value>;

/// Resolve a plain or dotted parameter path against a map.
///
/// `"user.address.city"` resolves `user` in the map, then each remaining
/// segment as an object field of the previous value. Returns `None` as soon
/// as any segment is missing or the intermediate value is not an object.
pub fn resolve_path<'a>(params: &'a ParamMap, path: &str) -> Option<&'a Value> {
    match path.split_once('.') {
        None => params.get(path),
        Some((head, rest)) => {
            let mut current = params.get(head)?;
            for segment in rest.split('.') {
                current = current.get(segment)?;
            }
            Some(current)
        }
    }
}

/// A value is "empty" if it is null, a blank string, or a zero-length array.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Numeric view of a value, if it has one.
pub fn numeric_value(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Stringified form used for string comparison: strings unquoted, everything
/// else in its JSON rendering.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
