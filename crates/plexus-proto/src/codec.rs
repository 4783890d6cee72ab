//! JSON encoding and decoding for envelope records.
//!
//! Records are compact JSON with explicit field names, so peers running
//! older or newer revisions can skip fields they do not understand. Nested
//! payloads are kept as [`RawValue`] and decoded only after the envelope has
//! been routed to a handler or tracker.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProtocolError;

/// Encodes a record as compact JSON.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))
}

/// Decodes a record from JSON bytes.
///
/// Unknown fields are ignored; malformed input yields an error, never a
/// panic.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
}

/// Encodes a value into an opaque nested payload.
pub fn to_raw<T: Serialize>(value: &T) -> Result<Box<RawValue>, ProtocolError> {
    serde_json::value::to_raw_value(value).map_err(|e| ProtocolError::Serialisation(e.to_string()))
}

/// Decodes an opaque nested payload into a concrete type.
pub fn from_raw<T: DeserializeOwned>(raw: &RawValue) -> Result<T, ProtocolError> {
    serde_json::from_str(raw.get()).map_err(|e| ProtocolError::Deserialisation(e.to_string()))
}
