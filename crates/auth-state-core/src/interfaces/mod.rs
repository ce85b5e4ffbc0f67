// crates/auth-state-core/src/interfaces/mod.rs
// ============================================================================
// Module: Auth State Interfaces
// Description: Backend-agnostic row storage contract and error surface.
// Purpose: Define the driver seam shared by the SQLite, Postgres, and memory backends.
// Dependencies: async-trait, serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! A [`RowBackend`] performs single-statement CRUD against one table using
//! fully-qualified row ids. It never builds ids itself and never decodes
//! values; session scoping and encoding live in the runtime layer.
//! Backends must surface absence as `None`, never as an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::IdentifierError;
use crate::core::SessionId;
use crate::core::TableName;

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One stored row.
///
/// # Invariants
/// - `id` is `{session}-{local_key}` for rows written through the runtime.
/// - `value`, when present, is JSON text produced by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Fully-namespaced row id.
    pub id: String,
    /// Encoded payload, if any.
    pub value: Option<String>,
    /// Session partition tag.
    pub session: String,
}

impl Row {
    /// Returns the payload when it is present and non-blank.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.value.as_deref().filter(|value| !value.trim().is_empty())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Filesystem or connection I/O failed.
    #[error("auth state store io error: {0}")]
    Io(String),
    /// Database driver reported an error.
    #[error("auth state store db error: {0}")]
    Db(String),
    /// Stored data could not be decoded or reconstructed.
    #[error("auth state store corruption: {0}")]
    Corrupt(String),
    /// Caller input is invalid.
    #[error("auth state store invalid input: {0}")]
    Invalid(String),
    /// Backend connection has been released.
    #[error("auth state store closed")]
    Closed,
    /// A key batch stopped partway through.
    #[error("auth state key batch failed after {applied} of {total} entries: {message}")]
    BatchFailed {
        /// Entries committed before the failure.
        applied: usize,
        /// Entries in the batch.
        total: usize,
        /// Underlying failure.
        message: String,
    },
}

impl From<IdentifierError> for StoreError {
    fn from(err: IdentifierError) -> Self {
        Self::Invalid(err.to_string())
    }
}

// ============================================================================
// SECTION: Row Backend
// ============================================================================

/// Driver-level row storage.
///
/// # Invariants
/// - Every method issues at most one statement against the table, except
///   [`RowBackend::ensure_table`] which may also create an index.
/// - Row mutations are atomic per row; nothing spans statements.
#[async_trait]
pub trait RowBackend: Send + Sync {
    /// Creates the table and its session index when absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema creation fails.
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError>;

    /// Reads one row by its fully-namespaced id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails. Absence is `Ok(None)`.
    async fn select_row(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError>;

    /// Inserts the row or overwrites its value and session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn upsert_row(&self, table: &TableName, row: &Row) -> Result<(), StoreError>;

    /// Deletes one row, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn delete_row(&self, table: &TableName, id: &str) -> Result<bool, StoreError>;

    /// Deletes every row of a session, optionally keeping one id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    async fn delete_session_rows(
        &self,
        table: &TableName,
        session: &SessionId,
        keep_id: Option<&str>,
    ) -> Result<u64, StoreError>;

    /// Releases the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the connection cannot be released cleanly.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Shared, type-erased backend handle.
pub type SharedRowBackend = Arc<dyn RowBackend>;
