// crates/auth-state-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Row Backend
// Description: RowBackend backed by one SQLite connection in WAL mode.
// Purpose: Provide durable single-row CRUD for the auth state table.
// Dependencies: auth-state-core, rusqlite, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`SqliteRowBackend`] serializes every statement through one mutex-guarded
//! connection and runs it on `tokio::task::spawn_blocking`. Upserts use
//! `INSERT ... ON CONFLICT (id) DO UPDATE`, so each row write is one atomic
//! statement. Closing takes the connection out of the mutex; later calls
//! fail with [`StoreError::Closed`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use auth_state_core::Row;
use auth_state_core::RowBackend;
use auth_state_core::SessionId;
use auth_state_core::StoreError;
use auth_state_core::TableName;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` row backend.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteBackendConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` backend errors.
///
/// # Invariants
/// - Error messages avoid embedding stored payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Connection already released.
    #[error("sqlite store closed")]
    Closed,
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Closed => Self::Closed,
        }
    }
}

/// Maps a rusqlite error to a db error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Shared connection slot; `None` once closed.
type ConnectionSlot = Arc<Mutex<Option<Connection>>>;

/// `SQLite`-backed row backend.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Table names are validated identifiers before interpolation.
#[derive(Clone)]
pub struct SqliteRowBackend {
    /// Backend configuration.
    config: SqliteBackendConfig,
    /// Connection guarded by a mutex.
    connection: ConnectionSlot,
}

impl SqliteRowBackend {
    /// Opens the database file, creating it and its parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unsafe or the database
    /// cannot be opened.
    pub fn open(config: SqliteBackendConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(&config)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(Some(connection))),
        })
    }

    /// Returns the backend configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Runs `op` against the open connection on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T, SqliteStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))?;
            let connection = guard.as_ref().ok_or(SqliteStoreError::Closed)?;
            op(connection)
        })
        .await
        .map_err(|err| SqliteStoreError::Io(format!("sqlite task failed: {err}")))?
    }
}

#[async_trait]
impl RowBackend for SqliteRowBackend {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                value TEXT CHECK (value IS NULL OR json_valid(value)),
                session TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {index} ON {table} (session);",
            table = table.quoted(),
            index = session_index_name(table),
        );
        self.run(move |connection| connection.execute_batch(&sql).map_err(db_error))
            .await
            .map_err(StoreError::from)
    }

    async fn select_row(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError> {
        let sql = format!("SELECT id, value, session FROM {} WHERE id = ?1", table.quoted());
        let id = id.to_string();
        self.run(move |connection| {
            connection
                .query_row(&sql, params![id], |row| {
                    Ok(Row {
                        id: row.get(0)?,
                        value: row.get(1)?,
                        session: row.get(2)?,
                    })
                })
                .optional()
                .map_err(db_error)
        })
        .await
        .map_err(StoreError::from)
    }

    async fn upsert_row(&self, table: &TableName, row: &Row) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, value, session) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET value = excluded.value, session = excluded.session",
            table.quoted()
        );
        let row = row.clone();
        self.run(move |connection| {
            connection
                .execute(&sql, params![row.id, row.value, row.session])
                .map(|_| ())
                .map_err(db_error)
        })
        .await
        .map_err(StoreError::from)
    }

    async fn delete_row(&self, table: &TableName, id: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.quoted());
        let id = id.to_string();
        self.run(move |connection| {
            connection.execute(&sql, params![id]).map(|count| count > 0).map_err(db_error)
        })
        .await
        .map_err(StoreError::from)
    }

    async fn delete_session_rows(
        &self,
        table: &TableName,
        session: &SessionId,
        keep_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let session = session.as_str().to_string();
        let keep_id = keep_id.map(str::to_string);
        let table = table.quoted();
        let deleted = self
            .run(move |connection| {
                let result = match keep_id {
                    Some(keep_id) => connection.execute(
                        &format!("DELETE FROM {table} WHERE session = ?1 AND id <> ?2"),
                        params![session, keep_id],
                    ),
                    None => connection.execute(
                        &format!("DELETE FROM {table} WHERE session = ?1"),
                        params![session],
                    ),
                };
                result.map_err(db_error)
            })
            .await?;
        Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
    }

    async fn close(&self) -> Result<(), StoreError> {
        let taken = self
            .connection
            .lock()
            .map_err(|_| StoreError::Io("sqlite mutex poisoned".to_string()))?
            .take();
        match taken {
            Some(connection) => connection.close().map_err(|(_, err)| db_error(err).into()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the quoted name of the session index for `table`.
fn session_index_name(table: &TableName) -> String {
    format!("\"{}_session_idx\"", table.as_str())
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteBackendConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteBackendConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
