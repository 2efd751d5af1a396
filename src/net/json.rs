//! JSON parsing and extraction utilities for API and browser-rendered payloads.
//!
//! Supports dot notation for navigating nested objects and arrays
//! (`"data.Page.media"`, `"data.0.session"`).
//!
//! # Examples
//!
//! ```rust
//! use shiori::net::json;
//! use serde_json::json;
//!
//! let data = json!({ "last_page": 3, "data": [{ "episode": 1 }, { "episode": 2 }] });
//!
//! assert_eq!(json::extract_array(&data, "data").len(), 2);
//! let last: u32 = json::extract_as(&data, "last_page").unwrap();
//! assert_eq!(last, 3);
//! ```

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Extracts a value from nested JSON using dot notation.
///
/// Numeric path segments index into arrays.
pub fn extract_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;

    for key in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => current.get(key)?,
        };
    }

    Some(current)
}

/// Extracts and deserializes a value from a nested JSON path.
///
/// # Errors
///
/// * [`Error::Parse`](crate::Error::Parse) - If the path doesn't exist
/// * [`Error::Json`](crate::Error::Json) - If deserialization fails
pub fn extract_as<T>(json: &Value, path: &str) -> crate::Result<T>
where
    T: DeserializeOwned,
{
    extract_path(json, path)
        .ok_or_else(|| crate::Error::parse(format!("Path not found: {}", path)))
        .and_then(|v| T::deserialize(v).map_err(Into::into))
}

/// Extracts an array from a nested JSON path.
///
/// Returns an empty vector when the path is missing or not an array.
pub fn extract_array(json: &Value, path: &str) -> Vec<Value> {
    extract_path(json, path)
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default()
}

/// String at `path`, accepting numbers as well (upstream APIs mix the two).
pub fn extract_string(json: &Value, path: &str) -> Option<String> {
    match extract_path(json, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses a JSON object out of text that may carry leading or trailing noise.
///
/// Browser-rendered JSON endpoints sometimes wrap the payload in markup or
/// whitespace. Everything before the first `{` and after the last `}` is dropped.
pub fn parse_embedded_object(text: &str) -> crate::Result<Value> {
    let start = text
        .find('{')
        .ok_or_else(|| crate::Error::parse("No JSON object in response body"))?;
    let end = text
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| crate::Error::parse("Unterminated JSON object in response body"))?;

    serde_json::from_str(&text[start..=end]).map_err(Into::into)
}
