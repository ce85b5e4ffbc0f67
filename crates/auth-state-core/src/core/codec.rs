// crates/auth-state-core/src/core/codec.rs
// ============================================================================
// Module: Auth State Codec
// Description: JSON text codec with a lossless tagged encoding for byte buffers.
// Purpose: Round-trip credentials and key material through a JSON column.
// Dependencies: base64, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Plain JSON cannot carry raw bytes, so every byte buffer is written as
//! `{"type":"Buffer","data":"<base64>"}`. Decoding revives any object carrying
//! that tag (or the alternate `{"buffer":true,"value":...}` form) back into
//! [`Value::Bytes`], accepting either base64 text or an array of octets.
//! Malformed buffer payloads are errors rather than silently dropped data.
//!
//! Typed structures opt in per field with `#[serde(with = "codec::buffer")]`
//! or `#[serde(with = "codec::buffer::optional")]`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Number;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Tag value marking an encoded byte buffer.
pub const BUFFER_TYPE_TAG: &str = "Buffer";
/// Field carrying the buffer tag.
const TYPE_FIELD: &str = "type";
/// Field carrying the encoded bytes.
const DATA_FIELD: &str = "data";
/// Alternate boolean marker field.
const ALT_FLAG_FIELD: &str = "buffer";
/// Alternate payload field used with [`ALT_FLAG_FIELD`].
const ALT_VALUE_FIELD: &str = "value";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Codec errors.
///
/// # Invariants
/// - Messages never embed the payload being decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// JSON text could not be produced or parsed.
    #[error("codec json error: {0}")]
    Json(String),
    /// A tagged buffer carried an unusable payload.
    #[error("codec buffer error: {0}")]
    Buffer(String),
}

/// Maps a `serde_json` error into a codec error.
fn json_error(err: &serde_json::Error) -> CodecError {
    CodecError::Json(err.to_string())
}

// ============================================================================
// SECTION: Value
// ============================================================================

/// Dynamic value tree that distinguishes byte buffers from JSON arrays.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// JSON null.
    #[default]
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(Number),
    /// JSON string.
    String(String),
    /// Raw byte buffer.
    Bytes(Vec<u8>),
    /// JSON array.
    Array(Vec<Self>),
    /// JSON object.
    Object(BTreeMap<String, Self>),
}

impl Value {
    /// Converts a typed value into a dynamic tree, reviving tagged buffers.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when serialization fails or a buffer tag is malformed.
    pub fn from_typed<T: Serialize + ?Sized>(value: &T) -> Result<Self, CodecError> {
        let json = serde_json::to_value(value).map_err(|err| json_error(&err))?;
        from_json(json)
    }

    /// Converts the dynamic tree into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Json`] when the tree does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, CodecError> {
        serde_json::from_value(to_json(&self)).map_err(|err| json_error(&err))
    }

    /// Returns the object field with the given name.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Self> {
        match self {
            Self::Object(map) => map.get(field),
            _ => None,
        }
    }

    /// Returns the bytes when this value is a buffer.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Self::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(flag) => serializer.serialize_bool(*flag),
            Self::Number(number) => number.serialize(serializer),
            Self::String(text) => serializer.serialize_str(text),
            Self::Bytes(bytes) => buffer::serialize(bytes, serializer),
            Self::Array(items) => items.serialize(serializer),
            Self::Object(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        from_json(json).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// SECTION: Text Codec
// ============================================================================

/// Encodes a dynamic value as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when serialization fails.
pub fn encode_value(value: &Value) -> Result<String, CodecError> {
    serde_json::to_string(&to_json(value)).map_err(|err| json_error(&err))
}

/// Decodes JSON text into a dynamic value, reviving tagged buffers.
///
/// # Errors
///
/// Returns [`CodecError`] when the text is not JSON or a buffer tag is malformed.
pub fn decode_value(text: &str) -> Result<Value, CodecError> {
    let json: serde_json::Value = serde_json::from_str(text).map_err(|err| json_error(&err))?;
    from_json(json)
}

/// Encodes a typed value as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when serialization fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(|err| json_error(&err))
}

/// Decodes JSON text into a typed value.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when the text does not match `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(|err| json_error(&err))
}

/// Converts a dynamic value into plain JSON, tagging every buffer.
#[must_use]
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(flag) => serde_json::Value::Bool(*flag),
        Value::Number(number) => serde_json::Value::Number(number.clone()),
        Value::String(text) => serde_json::Value::String(text.clone()),
        Value::Bytes(bytes) => tagged_buffer(bytes),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(key, item)| (key.clone(), to_json(item))).collect(),
        ),
    }
}

/// Converts plain JSON into a dynamic value, reviving tagged buffers.
///
/// # Errors
///
/// Returns [`CodecError::Buffer`] when a tagged buffer carries an invalid payload.
pub fn from_json(json: serde_json::Value) -> Result<Value, CodecError> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Bool(flag),
        serde_json::Value::Number(number) => Value::Number(number),
        serde_json::Value::String(text) => Value::String(text),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(from_json).collect::<Result<_, _>>()?)
        }
        serde_json::Value::Object(map) => {
            if is_tagged_buffer(&map) {
                Value::Bytes(tagged_buffer_bytes(&map)?)
            } else {
                Value::Object(
                    map.into_iter()
                        .map(|(key, item)| from_json(item).map(|item| (key, item)))
                        .collect::<Result<_, _>>()?,
                )
            }
        }
    })
}

// ============================================================================
// SECTION: Serde Helpers
// ============================================================================

/// Serde adapter for `Vec<u8>` fields using the tagged buffer encoding.
pub mod buffer {
    use serde::Deserialize;
    use serde::Deserializer;
    use serde::Serializer;
    use serde::ser::SerializeMap;

    use super::BUFFER_TYPE_TAG;
    use super::Base64;
    use super::DATA_FIELD;
    use super::Engine;
    use super::TYPE_FIELD;
    use super::bytes_from_json;

    /// Serializes bytes as a tagged buffer object.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(TYPE_FIELD, BUFFER_TYPE_TAG)?;
        map.serialize_entry(DATA_FIELD, &Base64.encode(bytes))?;
        map.end()
    }

    /// Deserializes bytes from a tagged buffer, octet array, or base64 string.
    ///
    /// # Errors
    ///
    /// Returns a deserializer error when the payload is not a usable buffer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        bytes_from_json(&json).map_err(serde::de::Error::custom)
    }

    /// Serde adapter for `Option<Vec<u8>>` fields.
    pub mod optional {
        use serde::Deserialize;
        use serde::Deserializer;
        use serde::Serializer;

        use super::super::bytes_from_json;

        /// Serializes optional bytes; `None` becomes JSON null.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => super::serialize(bytes, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserializes optional bytes; JSON null becomes `None`.
        ///
        /// # Errors
        ///
        /// Returns a deserializer error when a present payload is not a usable buffer.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            match Option::<serde_json::Value>::deserialize(deserializer)? {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(json) => bytes_from_json(&json).map(Some).map_err(serde::de::Error::custom),
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the tagged JSON object for a byte buffer.
fn tagged_buffer(bytes: &[u8]) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(TYPE_FIELD.to_string(), serde_json::Value::String(BUFFER_TYPE_TAG.to_string()));
    map.insert(DATA_FIELD.to_string(), serde_json::Value::String(Base64.encode(bytes)));
    serde_json::Value::Object(map)
}

/// Returns true when the object carries a buffer marker.
///
/// Any object with `type == "Buffer"` or `buffer == true` is treated as a
/// buffer, so plain objects using those fields do not round-trip.
fn is_tagged_buffer(map: &Map<String, serde_json::Value>) -> bool {
    map.get(TYPE_FIELD).and_then(serde_json::Value::as_str) == Some(BUFFER_TYPE_TAG)
        || map.get(ALT_FLAG_FIELD) == Some(&serde_json::Value::Bool(true))
}

/// Extracts the bytes from a tagged buffer object.
fn tagged_buffer_bytes(map: &Map<String, serde_json::Value>) -> Result<Vec<u8>, CodecError> {
    match map.get(DATA_FIELD).or_else(|| map.get(ALT_VALUE_FIELD)) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::String(text)) => base64_bytes(text),
        Some(serde_json::Value::Array(items)) => octet_bytes(items),
        Some(_) => Err(CodecError::Buffer("buffer data must be a string or array".to_string())),
    }
}

/// Decodes base64 text into bytes.
fn base64_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    Base64.decode(text).map_err(|err| CodecError::Buffer(format!("invalid base64: {err}")))
}

/// Converts an array of JSON numbers into bytes.
fn octet_bytes(items: &[serde_json::Value]) -> Result<Vec<u8>, CodecError> {
    items
        .iter()
        .map(|item| {
            item.as_u64().and_then(|octet| u8::try_from(octet).ok()).ok_or_else(|| {
                CodecError::Buffer("buffer array elements must be integers 0..=255".to_string())
            })
        })
        .collect()
}

/// Reads bytes from any accepted buffer representation.
fn bytes_from_json(json: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    match json {
        serde_json::Value::Object(map) if is_tagged_buffer(map) => tagged_buffer_bytes(map),
        serde_json::Value::Array(items) => octet_bytes(items),
        serde_json::Value::String(text) => base64_bytes(text),
        _ => Err(CodecError::Buffer("expected a tagged buffer".to_string())),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
