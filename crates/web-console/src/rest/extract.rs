//! Input resolution for the REST surface.
//!
//! A named scalar is looked up in the query string first, then a form
//! body, then a JSON body, with a raw-body fallback for clients that post
//! a bare value. First source that has the key wins.

use std::collections::HashMap;

use webcall_session_core::errors::{CoreError, CoreResult};

/// Resolve `key` from the request inputs.
pub fn resolve_input(
    key: &str,
    query: &HashMap<String, String>,
    content_type: Option<&str>,
    body: &[u8],
) -> Option<String> {
    if let Some(value) = query.get(key) {
        if !value.is_empty() {
            return Some(value.clone());
        }
    }

    let content_type = content_type.unwrap_or("");
    if content_type.starts_with("application/x-www-form-urlencoded") {
        if let Ok(form) = serde_urlencoded::from_bytes::<HashMap<String, String>>(body) {
            if let Some(value) = form.get(key) {
                if !value.is_empty() {
                    return Some(value.clone());
                }
            }
        }
    }

    if content_type.starts_with("application/json") {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
            match &value {
                serde_json::Value::Object(map) => {
                    if let Some(found) = map.get(key).and_then(scalar_to_string) {
                        return Some(found);
                    }
                }
                // A bare JSON scalar is the single-value payload itself.
                other => {
                    if let Some(found) = scalar_to_string(other) {
                        return Some(found);
                    }
                }
            }
        }
    }

    raw_scalar(body)
}

/// Like [`resolve_input`], but missing input is a `BadRequest`.
pub fn require_input(
    key: &str,
    query: &HashMap<String, String>,
    content_type: Option<&str>,
    body: &[u8],
) -> CoreResult<String> {
    resolve_input(key, query, content_type, body)
        .ok_or_else(|| CoreError::bad_request(format!("missing required input '{}'", key)))
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The raw-body fallback: a non-empty UTF-8 body that is not structured.
fn raw_scalar(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?.trim();
    if text.is_empty() || text.starts_with('{') || text.starts_with('[') {
        return None;
    }
    Some(text.trim_matches('"').to_string())
}
