//! Tolerant response parsing.
//!
//! Some servers declare `text/plain` for JSON, double-encode the payload
//! as a JSON string, or (Atmosphere long-polling) flush two objects into one
//! response body: `{"d":{..},"i":1}{"d":{..},"i":2}`. None of that may raise;
//! the worst outcome is `None`.

use serde_json::{Deserializer, Value};
use tracing::{debug, trace};

/// Parse a response body, merging concatenated top-level objects.
///
/// Returns whatever could be parsed before the first syntax error, or
/// `None` if nothing usable was found.
pub fn parse_lenient(body: &str) -> Option<Value> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let mut merged: Option<Value> = None;
    for item in Deserializer::from_str(body).into_iter::<Value>() {
        match item {
            Ok(value) => {
                trace!("merging concatenated payload");
                merged = Some(match merged {
                    Some(acc) => deep_merge(acc, value),
                    None => value,
                });
            }
            Err(e) => {
                debug!(error = %e, parsed = merged.is_some(), "response body not fully parseable");
                break;
            }
        }
    }
    merged
}

/// Normalize an already-decoded payload.
///
/// `null` becomes `None`; a JSON string is treated as text that still
/// needs parsing.
pub fn get_response(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(text) => parse_lenient(&text),
        other => Some(other),
    }
}

/// Objects merge key by key (recursively); anything else is replaced.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
