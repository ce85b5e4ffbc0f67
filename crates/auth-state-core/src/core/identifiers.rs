// crates/auth-state-core/src/core/identifiers.rs
// ============================================================================
// Module: Auth State Identifiers
// Description: Validated identifiers for tables, sessions, and local keys.
// Purpose: Keep row ids collision-free across sessions sharing one table.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Row ids are always `{session}-{local_key}`. Session identifiers therefore
//! reject the `-` separator, and table names are restricted to plain SQL
//! identifiers because backends interpolate them into statements.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::keys::KeyType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default table shared by every session.
pub const DEFAULT_TABLE_NAME: &str = "amiruldev_auth";
/// Default session tag used when callers do not supply one.
pub const DEFAULT_SESSION_ID: &str = "default";
/// Local key reserved for the credentials row.
pub const CREDS_KEY: &str = "creds";
/// Separator between the session tag and the local key.
pub const ROW_ID_SEPARATOR: char = '-';
/// Maximum table name length (Postgres identifier limit).
pub const MAX_TABLE_NAME_LENGTH: usize = 63;
/// Maximum session tag length.
pub const MAX_SESSION_ID_LENGTH: usize = 128;
/// Maximum caller supplied key id length.
pub const MAX_KEY_ID_LENGTH: usize = 512;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Table name is not a plain SQL identifier.
    #[error("invalid table name: {0}")]
    Table(String),
    /// Session tag is empty, too long, or contains reserved characters.
    #[error("invalid session id: {0}")]
    Session(String),
    /// Key id is empty or too long.
    #[error("invalid key id: {0}")]
    KeyId(String),
}

// ============================================================================
// SECTION: Table Name
// ============================================================================

/// Validated SQL table name.
///
/// # Invariants
/// - Starts with an ASCII letter or `_`; remaining bytes are ASCII
///   alphanumerics or `_`.
/// - At most [`MAX_TABLE_NAME_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    /// Validates and wraps a table name.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Table`] when the name is not a plain SQL identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, IdentifierError> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_TABLE_NAME_LENGTH {
            return Err(IdentifierError::Table(format!(
                "length must be 1..={MAX_TABLE_NAME_LENGTH} bytes"
            )));
        }
        let mut chars = name.chars();
        let leading_ok = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        if !leading_ok || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(IdentifierError::Table(format!("{name} is not a plain identifier")));
        }
        Ok(Self(name))
    }

    /// Returns the table name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name wrapped in double quotes for SQL interpolation.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE_NAME.to_string())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TableName {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for TableName {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.0
    }
}

// ============================================================================
// SECTION: Session Id
// ============================================================================

/// Session tag partitioning rows of one protocol-client instance.
///
/// # Invariants
/// - Non-empty and at most [`MAX_SESSION_ID_LENGTH`] bytes.
/// - Only ASCII alphanumerics and `_`, `.`, `:`, `@`; never the row id separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validates and wraps a session tag.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::Session`] when the tag is empty, too long, or
    /// contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_SESSION_ID_LENGTH {
            return Err(IdentifierError::Session(format!(
                "length must be 1..={MAX_SESSION_ID_LENGTH} bytes"
            )));
        }
        if let Some(bad) = id.chars().find(|ch| !is_session_char(*ch)) {
            return Err(IdentifierError::Session(format!(
                "{id} contains disallowed character '{bad}'"
            )));
        }
        Ok(Self(id))
    }

    /// Returns the session tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds the fully-namespaced row id for a local key.
    #[must_use]
    pub fn row_id(&self, local_key: &str) -> String {
        format!("{}{ROW_ID_SEPARATOR}{local_key}", self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION_ID.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = IdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

/// Returns true when the character may appear in a session tag.
const fn is_session_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | ':' | '@')
}

// ============================================================================
// SECTION: Local Key
// ============================================================================

/// Logical key inside one session, before session prefixing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocalKey {
    /// The credentials row.
    Creds,
    /// A key catalogue entry rendered as `{key_type}-{id}`.
    Key {
        /// Key category.
        key_type: KeyType,
        /// Caller supplied key id.
        id: String,
    },
}

impl LocalKey {
    /// Builds a key catalogue local key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError::KeyId`] when the id is empty or too long.
    pub fn key(key_type: KeyType, id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentifierError::KeyId(format!("empty id for {}", key_type.as_str())));
        }
        if id.len() > MAX_KEY_ID_LENGTH {
            return Err(IdentifierError::KeyId(format!(
                "id for {} exceeds {MAX_KEY_ID_LENGTH} bytes",
                key_type.as_str()
            )));
        }
        Ok(Self::Key {
            key_type,
            id,
        })
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creds => f.write_str(CREDS_KEY),
            Self::Key {
                key_type,
                id,
            } => write!(f, "{}{ROW_ID_SEPARATOR}{id}", key_type.as_str()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
