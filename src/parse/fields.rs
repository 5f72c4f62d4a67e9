//! Typed field access over decoded API objects.
//!
//! `required_*` accessors fail with [`ParseError::MissingField`] when the path
//! is absent (or null) and [`ParseError::TypeMismatch`] when it holds the
//! wrong JSON type. `optional_*` accessors return `None` in both cases.

use crate::error::ParseError;
use crate::resource::fetcher::extract_json_value;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn mismatch(path: &str, expected: &'static str) -> ParseError {
    ParseError::TypeMismatch {
        field: path.to_string(),
        expected,
    }
}

fn required<'a>(obj: &'a Value, path: &str) -> Result<&'a Value, ParseError> {
    extract_json_value(obj, path).ok_or_else(|| ParseError::MissingField(path.to_string()))
}

pub fn required_str<'a>(obj: &'a Value, path: &str) -> Result<&'a str, ParseError> {
    required(obj, path)?
        .as_str()
        .ok_or_else(|| mismatch(path, "string"))
}

/// Like [`required_str`] but an empty string counts as missing
pub fn required_non_empty_str<'a>(obj: &'a Value, path: &str) -> Result<&'a str, ParseError> {
    match required_str(obj, path)? {
        "" => Err(ParseError::MissingField(path.to_string())),
        s => Ok(s),
    }
}

pub fn required_bool(obj: &Value, path: &str) -> Result<bool, ParseError> {
    required(obj, path)?
        .as_bool()
        .ok_or_else(|| mismatch(path, "boolean"))
}

pub fn required_object<'a>(obj: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ParseError> {
    required(obj, path)?
        .as_object()
        .ok_or_else(|| mismatch(path, "object"))
}

pub fn optional_str(obj: &Value, path: &str) -> Option<String> {
    extract_json_value(obj, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn optional_bool(obj: &Value, path: &str) -> Option<bool> {
    extract_json_value(obj, path).and_then(Value::as_bool)
}

pub fn optional_i64(obj: &Value, path: &str) -> Option<i64> {
    let value = extract_json_value(obj, path)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}

pub fn optional_array<'a>(obj: &'a Value, path: &str) -> &'a [Value] {
    extract_json_value(obj, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Array of strings, skipping non-string entries
pub fn optional_str_list(obj: &Value, path: &str) -> Vec<String> {
    optional_array(obj, path)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Object of string values, skipping non-string entries
pub fn optional_str_map(obj: &Value, path: &str) -> BTreeMap<String, String> {
    extract_json_value(obj, path)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode a sub-object into a typed structure; absent or malformed yields `None`
pub fn optional_decode<T: DeserializeOwned>(obj: &Value, path: &str) -> Option<T> {
    let value = extract_json_value(obj, path)?;
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!("Ignoring malformed `{}`: {}", path, e);
            None
        }
    }
}
