// crates/auth-state-core/src/core/keys.rs
// ============================================================================
// Module: Auth State Key Catalogue
// Description: Closed catalogue of key categories and their stored entries.
// Purpose: Attach an explicit post-load transform to every key category.
// Dependencies: serde, crate::core::codec
// ============================================================================

//! ## Overview
//! Every stored key belongs to one [`KeyType`]. Loading a row runs
//! [`KeyType::reconstruct`], which is the identity for all categories except
//! [`KeyType::AppStateSyncKey`]; those entries are rebuilt into
//! [`AppStateSyncKeyData`] and fail loudly when the stored shape is wrong.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::codec;
use crate::core::codec::CodecError;
use crate::core::codec::Value;

// ============================================================================
// SECTION: Key Type
// ============================================================================

/// Key categories persisted by the store.
///
/// # Invariants
/// - Labels returned by [`KeyType::as_str`] are stable; they are part of row ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    /// One-time pre-keys.
    PreKey,
    /// Per-peer ratchet sessions.
    Session,
    /// Group sender keys.
    SenderKey,
    /// Record of which peers already hold a sender key.
    SenderKeyMemory,
    /// App state synchronization keys.
    AppStateSyncKey,
    /// App state synchronization versions.
    AppStateSyncVersion,
}

impl KeyType {
    /// Every key category, in catalogue order.
    pub const ALL: [Self; 6] = [
        Self::PreKey,
        Self::Session,
        Self::SenderKey,
        Self::SenderKeyMemory,
        Self::AppStateSyncKey,
        Self::AppStateSyncVersion,
    ];

    /// Returns the stable label used inside local keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreKey => "pre-key",
            Self::Session => "session",
            Self::SenderKey => "sender-key",
            Self::SenderKeyMemory => "sender-key-memory",
            Self::AppStateSyncKey => "app-state-sync-key",
            Self::AppStateSyncVersion => "app-state-sync-version",
        }
    }

    /// Applies the post-load transform for this category.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the stored value does not match the
    /// category's reconstructed shape.
    pub fn reconstruct(self, value: Value) -> Result<KeyEntry, CodecError> {
        match self {
            Self::AppStateSyncKey => value.into_typed().map(KeyEntry::AppStateSyncKey),
            Self::PreKey
            | Self::Session
            | Self::SenderKey
            | Self::SenderKeyMemory
            | Self::AppStateSyncVersion => Ok(KeyEntry::Raw(value)),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key_type| key_type.as_str() == value)
            .ok_or_else(|| format!("unknown key type: {value}"))
    }
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Value stored under one key catalogue entry.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyEntry {
    /// Entry handed back exactly as decoded.
    Raw(Value),
    /// Reconstructed app state sync key.
    AppStateSyncKey(AppStateSyncKeyData),
}

impl KeyEntry {
    /// Converts the entry into the dynamic tree written to storage.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when a reconstructed entry cannot be serialized.
    pub fn to_value(&self) -> Result<Value, CodecError> {
        match self {
            Self::Raw(value) => Ok(value.clone()),
            Self::AppStateSyncKey(data) => Value::from_typed(data),
        }
    }

    /// Returns the raw value when the entry was not reconstructed.
    #[must_use]
    pub const fn as_raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(value) => Some(value),
            Self::AppStateSyncKey(_) => None,
        }
    }
}

impl From<Value> for KeyEntry {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

impl From<AppStateSyncKeyData> for KeyEntry {
    fn from(value: AppStateSyncKeyData) -> Self {
        Self::AppStateSyncKey(value)
    }
}

/// Batched key mutation: `Some` upserts, `None` deletes.
pub type KeyPatch = BTreeMap<KeyType, BTreeMap<String, Option<KeyEntry>>>;

// ============================================================================
// SECTION: App State Sync Key
// ============================================================================

/// App state sync key material.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateSyncKeyData {
    /// Raw key bytes.
    #[serde(default, with = "codec::buffer::optional", skip_serializing_if = "Option::is_none")]
    pub key_data: Option<Vec<u8>>,
    /// Key fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<AppStateSyncKeyFingerprint>,
    /// Creation timestamp in seconds.
    #[serde(
        default,
        deserialize_with = "long::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
}

/// Fingerprint attached to an app state sync key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateSyncKeyFingerprint {
    /// Raw key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<u32>,
    /// Current key index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_index: Option<u32>,
    /// Device indexes covered by the key.
    #[serde(default)]
    pub device_indexes: Vec<u32>,
}

/// Lenient 64-bit integer decoding for protobuf-style timestamps.
mod long {
    use serde::Deserialize;
    use serde::Deserializer;

    /// Accepted wire shapes for a 64-bit integer.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum LongRepr {
        /// Plain JSON number.
        Number(i64),
        /// Decimal string.
        Text(String),
        /// Split `{low, high}` representation.
        Parts {
            /// Low 32 bits.
            low: i32,
            /// High 32 bits.
            high: i32,
        },
    }

    /// Deserializes an optional 64-bit integer from any accepted shape.
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        let Some(repr) = Option::<LongRepr>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match repr {
            LongRepr::Number(value) => Ok(Some(value)),
            LongRepr::Text(text) => text.trim().parse::<i64>().map(Some).map_err(|_| {
                serde::de::Error::custom(format!("invalid 64-bit integer string: {text}"))
            }),
            LongRepr::Parts {
                low,
                high,
            } => Ok(Some((i64::from(high) << 32) | i64::from(low.cast_unsigned()))),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::panic,
    reason = "Unit tests use expect and panic for setup clarity."
)]
mod tests {
    use super::*;

    #[test]
    fn key_type_labels_round_trip() {
        for key_type in KeyType::ALL {
            assert_eq!(key_type.as_str().parse::<KeyType>(), Ok(key_type));
        }
        assert!("identity-key".parse::<KeyType>().is_err());
    }

    #[test]
    fn non_sync_categories_return_raw_values() {
        let value = Value::from("opaque");
        let entry = KeyType::PreKey.reconstruct(value.clone()).expect("reconstruct");
        assert_eq!(entry, KeyEntry::Raw(value));
    }

    #[test]
    fn sync_key_accepts_long_object_timestamp() {
        let value = codec::decode_value(
            r#"{"keyData":{"type":"Buffer","data":"AQID"},"timestamp":{"low":5,"high":1,"unsigned":false}}"#,
        )
        .expect("decode");
        let entry = KeyType::AppStateSyncKey.reconstruct(value).expect("reconstruct");
        let KeyEntry::AppStateSyncKey(data) = entry else {
            panic!("expected reconstructed entry");
        };
        assert_eq!(data.key_data, Some(vec![1, 2, 3]));
        assert_eq!(data.timestamp, Some((1_i64 << 32) | 5));
    }

    #[test]
    fn sync_key_rejects_wrong_shape() {
        let value = codec::decode_value(r#"{"keyData":42}"#).expect("decode");
        assert!(KeyType::AppStateSyncKey.reconstruct(value).is_err());
    }
}
