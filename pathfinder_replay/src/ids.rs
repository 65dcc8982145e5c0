/// Entity id coercion and JSON truthiness helpers.
///
/// The audit log encodes ids inconsistently: `objId` is usually a JSON
/// number, path ids are decimal strings, and diff values may be either.
/// Everything is coerced to `i64` before it reaches the store.

use serde_json::Value;

use crate::domain::EntityId;
use crate::error::ReplayError;

/// Coerce a JSON id (number or decimal string) to an integer id.
pub fn coerce_id(value: &Value, what: &str) -> Result<EntityId, ReplayError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ReplayError::malformed(format!("{} is not an integer id: {}", what, value)))
}

/// Parse one decimal id taken from a route's trailing segment.
pub fn parse_path_id(raw: &str) -> Result<EntityId, ReplayError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ReplayError::malformed(format!("path id {:?} is not an integer", raw)))
}

/// Loose truthiness as the audit log producer uses it: null, false, 0,
/// empty strings and empty containers are all "unset".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// True when a diff value equals 1 (`1`, `1.0` or `true`).
pub fn is_one(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}
