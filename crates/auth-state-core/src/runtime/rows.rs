// crates/auth-state-core/src/runtime/rows.rs
// ============================================================================
// Module: Session Row Store
// Description: Session-scoped row CRUD over a shared table.
// Purpose: Build `{session}-{local_key}` ids and keep the session column consistent.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`RowStore`] owns one `{table, session}` pair and translates local keys
//! into fully-namespaced row ids before delegating to a [`RowBackend`].
//! Values are encoded with the codec on the way in; reads return raw rows so
//! callers decide how to treat blank payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::CREDS_KEY;
use crate::core::LocalKey;
use crate::core::SessionId;
use crate::core::TableName;
use crate::core::Value;
use crate::core::codec;
use crate::interfaces::Row;
use crate::interfaces::SharedRowBackend;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Row Store
// ============================================================================

/// Session-scoped view over one table.
///
/// # Invariants
/// - Every row written carries `session == self.session`.
/// - Every id is built with [`SessionId::row_id`].
#[derive(Clone)]
pub struct RowStore {
    /// Driver-level backend.
    backend: SharedRowBackend,
    /// Table holding every session.
    table: TableName,
    /// Session partition tag.
    session: SessionId,
}

impl RowStore {
    /// Creates a session-scoped row store.
    #[must_use]
    pub fn new(backend: SharedRowBackend, table: TableName, session: SessionId) -> Self {
        Self {
            backend,
            table,
            session,
        }
    }

    /// Returns the table this store writes to.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        &self.table
    }

    /// Returns the session tag.
    #[must_use]
    pub const fn session(&self) -> &SessionId {
        &self.session
    }

    /// Returns the underlying backend.
    #[must_use]
    pub const fn backend(&self) -> &SharedRowBackend {
        &self.backend
    }

    /// Builds the fully-namespaced id for a local key.
    #[must_use]
    pub fn row_id(&self, local_key: &LocalKey) -> String {
        self.session.row_id(&local_key.to_string())
    }

    /// Creates the table when absent. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema creation fails.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.backend.ensure_table(&self.table).await
    }

    /// Reads one row of this session from `table`.
    ///
    /// `local_key` is prefixed with the session tag; absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    pub async fn query_row(
        &self,
        table: &TableName,
        local_key: &str,
    ) -> Result<Option<Row>, StoreError> {
        if local_key.is_empty() {
            return Err(StoreError::Invalid("local key must not be empty".to_string()));
        }
        let id = self.session.row_id(local_key);
        self.backend.select_row(table, &id).await
    }

    /// Encodes `value` and writes it under `local_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when encoding fails, or the backend error.
    pub async fn upsert(&self, local_key: &LocalKey, value: &Value) -> Result<(), StoreError> {
        let encoded = codec::encode_value(value)
            .map_err(|err| StoreError::Invalid(format!("{local_key}: {err}")))?;
        self.upsert_encoded(local_key, encoded).await
    }

    /// Writes already-encoded JSON text under `local_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    pub async fn upsert_encoded(
        &self,
        local_key: &LocalKey,
        encoded: String,
    ) -> Result<(), StoreError> {
        let row = Row {
            id: self.row_id(local_key),
            value: Some(encoded),
            session: self.session.as_str().to_string(),
        };
        self.backend.upsert_row(&self.table, &row).await
    }

    /// Deletes the row for `local_key`; a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub async fn delete(&self, local_key: &LocalKey) -> Result<bool, StoreError> {
        self.backend.delete_row(&self.table, &self.row_id(local_key)).await
    }

    /// Deletes every row of this session, optionally keeping `creds`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub async fn delete_all_in_session(&self, exclude_creds: bool) -> Result<u64, StoreError> {
        let creds_id = self.session.row_id(CREDS_KEY);
        let keep_id = exclude_creds.then_some(creds_id.as_str());
        self.backend.delete_session_rows(&self.table, &self.session, keep_id).await
    }
}
