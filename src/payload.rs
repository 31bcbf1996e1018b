//! Field access for loosely typed JSON payloads.
//!
//! Clients send partially filled objects; every accessor names the offending
//! field in its [`ServiceError::Validation`] so callers can surface it as-is.

use serde_json::{Map, Value};

use crate::error::ServiceError;

pub type Object = Map<String, Value>;

pub fn as_object<'a>(payload: &'a Value, what: &str) -> Result<&'a Object, ServiceError> {
    payload
        .as_object()
        .ok_or_else(|| ServiceError::validation(format!("{what} payload must be a JSON object.")))
}

/// A present, non-null field.
pub fn field<'a>(object: &'a Object, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| !value.is_null())
}

/// Lenient integer coercion: integers as-is, finite floats truncated, numeric
/// strings parsed, booleans as 0/1.
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.trunc() as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}

/// Integer field floored at 0; absent means `default`.
pub fn non_negative_int(object: &Object, key: &str, default: i64) -> Result<u64, ServiceError> {
    let value = match field(object, key) {
        Some(raw) => coerce_int(raw)
            .ok_or_else(|| ServiceError::validation(format!("{key} must be an integer.")))?,
        None => default,
    };
    Ok(value.max(0) as u64)
}

/// Strict integer: only JSON integers are accepted.
pub fn strict_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        _ => None,
    }
}

/// JSON truthiness: null, false, 0, "" and empty containers are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |float| float != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

pub fn flag(object: &Object, key: &str) -> bool {
    object.get(key).map_or(false, truthy)
}

/// Optional timestamp text. Non-string values are rejected for `key`.
pub fn optional_str<'a>(object: &'a Object, key: &str) -> Result<Option<&'a str>, ServiceError> {
    match field(object, key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(_) => Err(ServiceError::validation(format!(
            "{key} must be an ISO 8601 string."
        ))),
    }
}
