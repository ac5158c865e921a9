//! Envelope codec for bus message bodies.
//!
//! Every body exchanged over the bus is a JSON object carrying a
//! machine-generated `timestamp` plus a free-form field set. Encoding never
//! fails; decoding malformed input yields a [`CodecError`] that receivers
//! treat as drop-and-log, never as fatal: the bus has no sender to report
//! back to.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::clock::{format_wire_timestamp, ClockSource};

/// Reserved field name for the generation timestamp.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Field name carrying the correlation id in tagged requests and responses.
pub const CORRELATION_FIELD: &str = "id";

/// Errors produced when decoding or projecting an envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input was not valid JSON, or a typed projection did not match.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The input parsed as JSON but was not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// A decoded (or to-be-encoded) message body.
///
/// The `timestamp` is always machine-generated at build time; a
/// caller-supplied `timestamp` field is discarded, never trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    timestamp: String,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Builds an envelope from any serializable payload, stamping it with
    /// the injected clock.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotAnObject`] if the payload does not serialize
    /// to a JSON object (envelopes are always objects on the wire).
    pub fn build<T: Serialize>(payload: &T, clock: &dyn ClockSource) -> Result<Self, CodecError> {
        let value = serde_json::to_value(payload)?;
        let Value::Object(mut fields) = value else {
            return Err(CodecError::NotAnObject);
        };
        fields.remove(TIMESTAMP_FIELD);
        Ok(Self {
            timestamp: format_wire_timestamp(clock.now_millis()),
            fields,
        })
    }

    /// Serializes the envelope to wire bytes. Never fails: a string-keyed
    /// JSON map always serializes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut obj = self.fields.clone();
        obj.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::String(self.timestamp.clone()),
        );
        serde_json::to_vec(&Value::Object(obj)).expect("string-keyed JSON map always serializes")
    }

    /// Parses wire bytes into an envelope.
    ///
    /// A missing or non-string `timestamp` is tolerated on inbound messages
    /// (it decodes as empty); only structurally malformed input is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] for invalid JSON and
    /// [`CodecError::NotAnObject`] for valid JSON that is not an object.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut fields) = value else {
            return Err(CodecError::NotAnObject);
        };
        let timestamp = match fields.remove(TIMESTAMP_FIELD) {
            Some(Value::String(ts)) => ts,
            _ => String::new(),
        };
        Ok(Self { timestamp, fields })
    }

    /// The generation timestamp string.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Raw access to a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field projected as a string slice, if present and a string.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Inserts or replaces a field. Used by the correlation layer to stamp
    /// request ids onto outbound envelopes.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// Projects the field set onto a typed payload struct.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Malformed`] if the fields do not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }
}
