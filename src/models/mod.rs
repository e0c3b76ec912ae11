pub mod task;
pub mod timestamp;
pub mod user;

pub use task::*;
pub use user::*;

use serde_json::{Map, Value};

/// Loose boolean coercion shared by payloads and filters:
/// `true`/`false`, numbers (non-zero is true), and the strings
/// `true`/`false`/`1`/`0`.
pub fn json_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First of `keys` present with a non-null value. `Some(Value::Null)` when a
/// key is present but every present key is null, `None` when all are absent.
pub(crate) fn pick<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    let mut saw_null = None;
    for key in keys {
        match obj.get(*key) {
            Some(Value::Null) => saw_null = saw_null.or(obj.get(*key)),
            Some(v) => return Some(v),
            None => {}
        }
    }
    saw_null
}

pub(crate) fn optional_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
