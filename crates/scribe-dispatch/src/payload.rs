//! Typed payloads at the boundary.
//!
//! Callers submit opaque JSON; internally we classify it into a tagged
//! variant so the known shapes get typed access, with an explicit opaque
//! fallback for everything else. The wire form is always the raw JSON
//! object, so sealing and storage are unaffected by the classification.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// A classified dispatch payload.
///
/// Only JSON objects (or null) are accepted at the boundary; anything else
/// is a validation error rather than a silent coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A reasoning invocation carrying a caller prompt.
    Invocation {
        /// The caller-supplied prompt.
        prompt: String,
        /// Any additional fields submitted alongside the prompt.
        extra: Map<String, Value>,
    },
    /// An observer notification.
    Broadcast {
        /// Delivery channel.
        channel: String,
        /// Human-readable message.
        message: String,
    },
    /// Unrecognized object shape, carried as-is.
    Opaque(Map<String, Value>),
    /// No payload (e.g. a result before completion).
    Empty,
}

impl Payload {
    /// Classifies a JSON value into a payload.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not a JSON object or null.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Object(map) if map.is_empty() => Ok(Self::Empty),
            Value::Object(map) => Ok(Self::classify(map)),
            other => Err(Error::validation(format!(
                "payload must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn classify(mut map: Map<String, Value>) -> Self {
        if let Some(Value::String(prompt)) = map.get("prompt").cloned() {
            map.remove("prompt");
            return Self::Invocation { prompt, extra: map };
        }

        if map.len() == 2 {
            if let (Some(Value::String(channel)), Some(Value::String(message))) =
                (map.get("channel"), map.get("message"))
            {
                return Self::Broadcast {
                    channel: channel.clone(),
                    message: message.clone(),
                };
            }
        }

        Self::Opaque(map)
    }

    /// Creates a broadcast payload.
    #[must_use]
    pub fn broadcast(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Broadcast {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Returns the JSON object form of this payload.
    ///
    /// `Empty` maps to `{}` so sealed records always hash a concrete value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Invocation { prompt, extra } => {
                let mut map = extra.clone();
                map.insert("prompt".to_string(), Value::String(prompt.clone()));
                Value::Object(map)
            }
            Self::Broadcast { channel, message } => {
                let mut map = Map::new();
                map.insert("channel".to_string(), Value::String(channel.clone()));
                map.insert("message".to_string(), Value::String(message.clone()));
                Value::Object(map)
            }
            Self::Opaque(map) => Value::Object(map.clone()),
            Self::Empty => Value::Object(Map::new()),
        }
    }

    /// Returns true if this payload carries no data.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Empty
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(D::Error::custom)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
