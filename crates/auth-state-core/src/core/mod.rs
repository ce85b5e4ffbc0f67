// crates/auth-state-core/src/core/mod.rs
// ============================================================================
// Module: Auth State Core Types
// Description: Identifiers, value codec, and key catalogue types.
// Purpose: Provide the stable data model shared by every backend.
// Dependencies: base64, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Core types describe what is stored: validated table and session
//! identifiers, the byte-preserving JSON codec, and the closed catalogue of
//! key categories with their post-load transforms.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod codec;
pub mod identifiers;
pub mod keys;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codec::BUFFER_TYPE_TAG;
pub use codec::CodecError;
pub use codec::Value;
pub use codec::decode;
pub use codec::decode_value;
pub use codec::encode;
pub use codec::encode_value;
pub use identifiers::CREDS_KEY;
pub use identifiers::DEFAULT_SESSION_ID;
pub use identifiers::DEFAULT_TABLE_NAME;
pub use identifiers::IdentifierError;
pub use identifiers::LocalKey;
pub use identifiers::SessionId;
pub use identifiers::TableName;
pub use keys::AppStateSyncKeyData;
pub use keys::AppStateSyncKeyFingerprint;
pub use keys::KeyEntry;
pub use keys::KeyPatch;
pub use keys::KeyType;
