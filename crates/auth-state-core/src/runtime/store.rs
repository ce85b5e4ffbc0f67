// crates/auth-state-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Row Backend
// Description: Simple in-memory row backend for tests and demos.
// Purpose: Provide a deterministic backend without external deps.
// Dependencies: async-trait, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryRowBackend`] keeps one ordered map per table behind a mutex. It
//! honors the same contract as the SQL backends, including `Closed` errors
//! after [`RowBackend::close`]. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;

use crate::core::SessionId;
use crate::core::TableName;
use crate::interfaces::Row;
use crate::interfaces::RowBackend;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Backend
// ============================================================================

/// Table contents keyed by row id.
type TableRows = BTreeMap<String, Row>;

/// Backend state guarded by the mutex.
#[derive(Debug, Default)]
struct MemoryState {
    /// Tables keyed by name.
    tables: BTreeMap<String, TableRows>,
    /// Whether the backend has been closed.
    closed: bool,
}

/// In-memory row backend for tests and examples.
///
/// Clones share the same state, so two stores built from clones behave like
/// two processes sharing one database.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRowBackend {
    /// Shared state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRowBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tables created so far.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the mutex is poisoned.
    pub fn table_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.tables.len())
    }

    /// Locks the state without checking the closed flag.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Io("in-memory backend mutex poisoned".to_string()))
    }

    /// Locks the state and fails once the backend is closed.
    fn open_state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        let guard = self.lock()?;
        if guard.closed {
            return Err(StoreError::Closed);
        }
        Ok(guard)
    }
}

/// Returns the table rows or a db error when the table was never created.
fn table_mut<'a>(
    state: &'a mut MemoryState,
    table: &TableName,
) -> Result<&'a mut TableRows, StoreError> {
    state
        .tables
        .get_mut(table.as_str())
        .ok_or_else(|| StoreError::Db(format!("no such table: {table}")))
}

#[async_trait]
impl RowBackend for InMemoryRowBackend {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        let mut guard = self.open_state()?;
        guard.tables.entry(table.as_str().to_string()).or_default();
        Ok(())
    }

    async fn select_row(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError> {
        let mut guard = self.open_state()?;
        Ok(table_mut(&mut guard, table)?.get(id).cloned())
    }

    async fn upsert_row(&self, table: &TableName, row: &Row) -> Result<(), StoreError> {
        let mut guard = self.open_state()?;
        table_mut(&mut guard, table)?.insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn delete_row(&self, table: &TableName, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.open_state()?;
        Ok(table_mut(&mut guard, table)?.remove(id).is_some())
    }

    async fn delete_session_rows(
        &self,
        table: &TableName,
        session: &SessionId,
        keep_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut guard = self.open_state()?;
        let rows = table_mut(&mut guard, table)?;
        let before = rows.len();
        rows.retain(|id, row| row.session != session.as_str() || Some(id.as_str()) == keep_id);
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.lock()?.closed = true;
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
