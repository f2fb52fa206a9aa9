//! Canonical JSON encoding for deterministic serialization.
//!
//! Content addresses are computed over these bytes, so the encoding must be
//! identical on every platform:
//! - Object keys sorted by UTF-8 byte order
//! - No insignificant whitespace
//! - Strings escaped exactly as serde_json escapes them
//! - Numbers in serde_json's shortest round-trip form
//!
//! Two values that compare equal as JSON always encode to the same bytes.

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::header::CoValueHeader;

/// Encode a JSON value to its canonical text.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Serialize any value through serde_json and return the canonical text.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CoreError> {
    let value = serde_json::to_value(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(canonical_json(&value))
}

/// Encode a coValue header to canonical bytes.
///
/// These are the bytes hashed into the coValue id.
pub fn canonical_header_bytes(header: &CoValueHeader) -> Vec<u8> {
    canonical_json(&header.to_value()).into_bytes()
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // Serializing a str through serde_json cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => out.push_str(&escaped),
        Err(_) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
    }
}
