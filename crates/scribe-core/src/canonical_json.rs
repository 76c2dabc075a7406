//! Canonical JSON serialization for deterministic hashing.
//!
//! Seals are digests over the canonical form of a dispatch's fields, so two
//! logically-equal payloads must produce identical bytes regardless of the
//! key order a caller happened to use.
//!
//! Canonical JSON here means:
//!
//! - Object keys sorted lexicographically (UTF-8 byte order), recursively
//! - No whitespace
//! - Array order preserved
//! - Integers only; floats are rejected because their stringification is not
//!   stable across languages, and verification must be reproducible by
//!   non-Rust collaborators
//!
//! Callers that need fractional values should encode them as strings or
//! scaled integers (millis, basis points, etc.).

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Errors that can occur during canonical serialization.
///
/// These are non-retryable: the caller must fix the input.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// The value could not be converted to a JSON tree.
    #[error("serde_json error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Float values are not allowed in canonical JSON.
    #[error("float values are not allowed in canonical JSON (use integers or strings)")]
    FloatNotAllowed,
}

/// Serializes `value` into canonical JSON, returned as a UTF-8 string.
///
/// # Errors
///
/// Returns [`EncodingError::Serde`] if the value cannot be represented as
/// JSON, or [`EncodingError::FloatNotAllowed`] if it contains a float.
#[must_use = "canonical form should be used for hashing"]
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, EncodingError> {
    let tree = serde_json::to_value(value)?;
    let mut out = String::new();
    write_value(&tree, &mut out)?;
    Ok(out)
}

/// Serializes `value` into canonical JSON bytes.
///
/// # Errors
///
/// Same failure modes as [`to_canonical_string`].
#[must_use = "canonical bytes should be used for hashing"]
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodingError> {
    Ok(to_canonical_string(value)?.into_bytes())
}

fn write_value(value: &Value, out: &mut String) -> Result<(), EncodingError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(n, out)?,
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => write_object(map, out)?,
    }
    Ok(())
}

fn write_object(map: &Map<String, Value>, out: &mut String) -> Result<(), EncodingError> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(key, out)?;
        out.push(':');
        if let Some(value) = map.get(*key) {
            write_value(value, out)?;
        }
    }
    out.push('}');
    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<(), EncodingError> {
    // serde_json's escaping is deterministic; reuse it for quoting.
    let quoted = serde_json::to_string(s)?;
    out.push_str(&quoted);
    Ok(())
}

fn write_number(n: &Number, out: &mut String) -> Result<(), EncodingError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
        return Ok(());
    }
    // serde_json::Number only stores a float when the value does not fit
    // an integer representation.
    Err(EncodingError::FloatNotAllowed)
}
