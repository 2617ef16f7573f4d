//! Flat value codecs
//!
//! The flat engine stores strings. A [`ValueCodec`] turns values into those
//! strings and back, and owns the legacy envelope rule: structured values
//! written as `{"-moz-stringifier": value}` are unwrapped on read.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{StorageError, StorageResult};
use crate::constants::ENVELOPE_MARKER_KEY;

// =============================================================================
// Codec Kind
// =============================================================================

/// Selects the codec used by the flat backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Wrap structured values in the envelope, write scalars raw
    LegacyEnvelope,
    /// Write every value as plain JSON
    #[default]
    PlainJson,
}

impl CodecKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegacyEnvelope => "legacy",
            Self::PlainJson => "plain",
        }
    }

    /// Build the codec.
    #[must_use]
    pub fn codec(&self) -> Box<dyn ValueCodec> {
        match self {
            Self::LegacyEnvelope => Box::new(LegacyEnvelopeCodec),
            Self::PlainJson => Box::new(PlainJsonCodec),
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" | "legacy_envelope" => Ok(Self::LegacyEnvelope),
            "plain" | "plain_json" => Ok(Self::PlainJson),
            other => Err(format!("unknown codec: {other}")),
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ValueCodec
// =============================================================================

/// Encoding between values and flat engine strings.
pub trait ValueCodec: Send + Sync {
    /// Encode a non-null value.
    ///
    /// # Errors
    /// Returns [`StorageError::Encode`] if serialization fails.
    fn encode(&self, value: &Value) -> StorageResult<String>;

    /// Decode a stored string.
    ///
    /// # Errors
    /// Returns [`StorageError::Decode`] if the string is not JSON.
    fn decode(&self, raw: &str) -> StorageResult<Value>;
}

/// Writes objects and arrays inside the envelope, scalars as raw text.
///
/// Strings go in without quotes, so on read a string that happens to look
/// like JSON (`"42"`, `"true"`, `"null"`) comes back as that JSON value.
/// Only for hosts that must keep writing the old format; values do not
/// round-trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyEnvelopeCodec;

impl ValueCodec for LegacyEnvelopeCodec {
    fn encode(&self, value: &Value) -> StorageResult<String> {
        assert!(!value.is_null(), "null values are removed, never encoded");

        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Object(_) | Value::Array(_) => {
                let mut envelope = Map::with_capacity(1);
                envelope.insert(ENVELOPE_MARKER_KEY.to_string(), value.clone());
                serde_json::to_string(&Value::Object(envelope))
                    .map_err(|source| StorageError::Encode { source })
            }
            other => Ok(other.to_string()),
        }
    }

    fn decode(&self, raw: &str) -> StorageResult<Value> {
        decode_unwrapping(raw)
    }
}

/// Writes every value as JSON; still reads legacy envelopes.
///
/// The default. Every non-null value reads back as written.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainJsonCodec;

impl ValueCodec for PlainJsonCodec {
    fn encode(&self, value: &Value) -> StorageResult<String> {
        assert!(!value.is_null(), "null values are removed, never encoded");

        serde_json::to_string(value).map_err(|source| StorageError::Encode { source })
    }

    fn decode(&self, raw: &str) -> StorageResult<Value> {
        decode_unwrapping(raw)
    }
}

fn decode_unwrapping(raw: &str) -> StorageResult<Value> {
    let value: Value =
        serde_json::from_str(raw).map_err(|source| StorageError::Decode { source })?;
    Ok(unwrap_envelope(value))
}

/// Return the inner value of an envelope, or the value itself.
///
/// Only a truthy inner value is unwrapped; `{"-moz-stringifier": 0}` stays
/// as it is.
#[must_use]
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.get(ENVELOPE_MARKER_KEY).is_some_and(is_truthy) =>
        {
            map.remove(ENVELOPE_MARKER_KEY).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// Tests
// =============================================================================
