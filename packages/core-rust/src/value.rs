//! Tagged stored-value type for the KV state engine.
//!
//! The original protocol stored every value as text and guessed at read time
//! whether it was structured. Here the decision is made once, at write time,
//! and persisted with an explicit tag so reads never guess. Plain strings
//! stay [`StoredValue::Scalar`]; every other JSON value (objects, arrays,
//! numbers, booleans, null) is carried as a [`StoredValue::Structured`]
//! document so it round-trips unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A value held by the state engine, tagged at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum StoredValue {
    /// A plain text value.
    Scalar(String),
    /// A structured JSON document (object, array, number, boolean, or null).
    Structured(Value),
}

impl StoredValue {
    /// Classifies a wire value at write time.
    #[must_use]
    pub fn from_wire(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Scalar(s.clone()),
            other => Self::Structured(other.clone()),
        }
    }

    /// Reproduces the wire-facing JSON value, unchanged from what was set.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Scalar(s) => Value::String(s.clone()),
            Self::Structured(v) => v.clone(),
        }
    }

    /// Canonical tagged text form used by persistent engines.
    #[must_use]
    pub fn to_storage(&self) -> String {
        serde_json::to_string(self).expect("tagged value always serializes")
    }

    /// Decodes the tagged text form.
    ///
    /// Rows written before tagging existed fall back to [`StoredValue::Scalar`]
    /// holding the raw text.
    #[must_use]
    pub fn from_storage(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_else(|_| Self::Scalar(raw.to_string()))
    }
}
