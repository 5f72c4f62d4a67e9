//! Resource Fetcher
//!
//! The client seam the engine reads through, and helpers for unpacking list
//! responses.

use super::registry::FetchRequest;
use crate::error::{FetchError, ParseError};
use async_trait::async_trait;
use serde_json::Value;

/// One read against the backing API.
///
/// Implementations must report a missing object as [`FetchError::NotFound`]
/// so callers can tell expected absence from a failed request.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    async fn get(&self, request: &FetchRequest) -> Result<Value, FetchError>;
}

/// Borrow the `items` array of a list response
pub fn list_items(response: &Value) -> Result<&[Value], ParseError> {
    match response.get("items") {
        None | Some(Value::Null) => Err(ParseError::MissingField("items".to_string())),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ParseError::TypeMismatch {
            field: "items".to_string(),
            expected: "array",
        }),
    }
}

/// Like [`list_items`] but treats a missing `items` field as an empty list
pub fn list_items_or_empty(response: &Value) -> &[Value] {
    list_items(response).unwrap_or(&[])
}

/// Extract a value from JSON using a dot-notation path
pub fn extract_json_value<'a>(item: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = item;

    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    match current {
        Value::Null => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_items() {
        let response = json!({"kind": "List", "items": [{"a": 1}, {"a": 2}]});
        assert_eq!(list_items(&response).unwrap().len(), 2);
    }

    #[test]
    fn test_list_items_missing_and_mistyped() {
        assert_eq!(
            list_items(&json!({"kind": "List"})),
            Err(ParseError::MissingField("items".to_string()))
        );
        assert!(matches!(
            list_items(&json!({"items": {}})),
            Err(ParseError::TypeMismatch { .. })
        ));
        assert!(list_items_or_empty(&json!({"items": null})).is_empty());
    }

    #[test]
    fn test_extract_json_value() {
        let item = json!({
            "metadata": {"name": "vm-1"},
            "status": {"conditions": [{"type": "Ready"}, {"type": "Paused"}]}
        });

        assert_eq!(extract_json_value(&item, "metadata.name"), Some(&json!("vm-1")));
        assert_eq!(
            extract_json_value(&item, "status.conditions.1.type"),
            Some(&json!("Paused"))
        );
        assert_eq!(extract_json_value(&item, "status.phase"), None);
    }
}
