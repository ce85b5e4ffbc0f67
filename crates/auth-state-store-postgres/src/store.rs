// crates/auth-state-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Row Backend
// Description: RowBackend over one blocking Postgres client with JSONB values.
// Purpose: Provide shared, multi-process auth state storage.
// Dependencies: auth-state-core, postgres, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! [`PostgresRowBackend`] owns exactly one [`postgres::Client`]. Every
//! statement runs on `tokio::task::spawn_blocking` behind a mutex, so a
//! handle issues one statement at a time. Schema creation tolerates the
//! catalog races Postgres reports when several processes run
//! `CREATE TABLE IF NOT EXISTS` concurrently. The client is released either
//! by [`RowBackend::close`] or, on drop, on a dedicated thread so no async
//! runtime ever tears it down.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use auth_state_core::Row;
use auth_state_core::RowBackend;
use auth_state_core::SessionId;
use auth_state_core::StoreError;
use auth_state_core::TableName;
use postgres::Client;
use postgres::NoTls;
use postgres::error::SqlState;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Postgres backend configuration.
///
/// # Invariants
/// - `host`, `user`, and `database` are non-empty.
/// - Timeouts are milliseconds and greater than zero.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresBackendConfig {
    /// Server host name or socket directory.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: Option<String>,
    /// Database name.
    pub database: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    pub statement_timeout_ms: u64,
}

impl Default for PostgresBackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            connect_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
        }
    }
}

impl fmt::Debug for PostgresBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresBackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish()
    }
}

impl PostgresBackendConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError::Invalid`] when a required field is empty
    /// or a timeout is zero.
    pub fn validate(&self) -> Result<(), PostgresStoreError> {
        for (name, value) in
            [("host", &self.host), ("user", &self.user), ("database", &self.database)]
        {
            if value.trim().is_empty() {
                return Err(PostgresStoreError::Invalid(format!("{name} must not be empty")));
            }
        }
        if self.connect_timeout_ms == 0 || self.statement_timeout_ms == 0 {
            return Err(PostgresStoreError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the driver configuration.
    #[must_use]
    pub fn to_pg_config(&self) -> postgres::Config {
        let mut pg_config = postgres::Config::new();
        pg_config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .dbname(&self.database)
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms));
        if let Some(password) = &self.password {
            pg_config.password(password);
        }
        let options = format!("-c statement_timeout={}", self.statement_timeout_ms);
        pg_config.options(&options);
        pg_config
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres backend errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostgresStoreError {
    /// Postgres error.
    #[error("postgres store error: {0}")]
    Postgres(String),
    /// Invalid configuration or data.
    #[error("postgres store invalid data: {0}")]
    Invalid(String),
    /// Blocking task or mutex failure.
    #[error("postgres store io error: {0}")]
    Io(String),
    /// Client already released.
    #[error("postgres store closed")]
    Closed,
}

impl From<PostgresStoreError> for StoreError {
    fn from(error: PostgresStoreError) -> Self {
        match error {
            PostgresStoreError::Postgres(message) => Self::Db(message),
            PostgresStoreError::Invalid(message) => Self::Invalid(message),
            PostgresStoreError::Io(message) => Self::Io(message),
            PostgresStoreError::Closed => Self::Closed,
        }
    }
}

/// Maps a driver error to a backend error.
#[allow(clippy::needless_pass_by_value, reason = "Used directly as a map_err adapter.")]
fn pg_error(err: postgres::Error) -> PostgresStoreError {
    PostgresStoreError::Postgres(err.to_string())
}

/// Returns true for errors raised by concurrent `CREATE ... IF NOT EXISTS`.
fn is_schema_race(err: &postgres::Error) -> bool {
    err.code().is_some_and(|code| {
        code == &SqlState::UNIQUE_VIOLATION
            || code == &SqlState::DUPLICATE_TABLE
            || code == &SqlState::DUPLICATE_OBJECT
    })
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// Owned client slot; `None` once closed.
struct ClientSlot {
    /// Client guarded by a mutex.
    client: Mutex<Option<Client>>,
}

impl Drop for ClientSlot {
    fn drop(&mut self) {
        if let Ok(slot) = self.client.get_mut()
            && let Some(client) = slot.take()
        {
            let _ = std::thread::spawn(move || drop(client));
        }
    }
}

/// Postgres-backed row backend.
///
/// # Invariants
/// - Client access is serialized through a mutex.
/// - Table names are validated identifiers before interpolation.
#[derive(Clone)]
pub struct PostgresRowBackend {
    /// Shared client slot.
    slot: Arc<ClientSlot>,
}

impl PostgresRowBackend {
    /// Connects to the server described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError`] when the config is invalid or the
    /// connection fails.
    pub async fn connect(config: &PostgresBackendConfig) -> Result<Self, PostgresStoreError> {
        config.validate()?;
        let pg_config = config.to_pg_config();
        let client = tokio::task::spawn_blocking(move || pg_config.connect(NoTls))
            .await
            .map_err(|err| PostgresStoreError::Io(format!("postgres task failed: {err}")))?
            .map_err(pg_error)?;
        Ok(Self {
            slot: Arc::new(ClientSlot {
                client: Mutex::new(Some(client)),
            }),
        })
    }

    /// Runs `op` against the open client on the blocking pool.
    async fn run<T, F>(&self, op: F) -> Result<T, PostgresStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, PostgresStoreError> + Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .client
                .lock()
                .map_err(|_| PostgresStoreError::Io("postgres mutex poisoned".to_string()))?;
            let client = guard.as_mut().ok_or(PostgresStoreError::Closed)?;
            op(client)
        })
        .await
        .map_err(|err| PostgresStoreError::Io(format!("postgres task failed: {err}")))?
    }
}

#[async_trait]
impl RowBackend for PostgresRowBackend {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (id TEXT PRIMARY KEY, value JSONB, session TEXT \
             NOT NULL); CREATE INDEX IF NOT EXISTS {index} ON {table} (session);",
            table = table.quoted(),
            index = session_index_name(table),
        );
        self.run(move |client| match client.batch_execute(&sql) {
            Ok(()) => Ok(()),
            Err(err) if is_schema_race(&err) => Ok(()),
            Err(err) => Err(pg_error(err)),
        })
        .await
        .map_err(StoreError::from)
    }

    async fn select_row(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError> {
        let sql = format!("SELECT id, value::TEXT, session FROM {} WHERE id = $1", table.quoted());
        let id = id.to_string();
        self.run(move |client| {
            let Some(row) = client.query_opt(&sql, &[&id]).map_err(pg_error)? else {
                return Ok(None);
            };
            Ok(Some(Row {
                id: row.try_get(0).map_err(pg_error)?,
                value: row.try_get(1).map_err(pg_error)?,
                session: row.try_get(2).map_err(pg_error)?,
            }))
        })
        .await
        .map_err(StoreError::from)
    }

    async fn upsert_row(&self, table: &TableName, row: &Row) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, value, session) VALUES ($1, CAST($2::TEXT AS JSONB), $3) ON \
             CONFLICT (id) DO UPDATE SET value = EXCLUDED.value, session = EXCLUDED.session",
            table.quoted()
        );
        let row = row.clone();
        self.run(move |client| {
            client
                .execute(&sql, &[&row.id, &row.value, &row.session])
                .map(|_| ())
                .map_err(pg_error)
        })
        .await
        .map_err(StoreError::from)
    }

    async fn delete_row(&self, table: &TableName, id: &str) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table.quoted());
        let id = id.to_string();
        self.run(move |client| client.execute(&sql, &[&id]).map(|count| count > 0).map_err(pg_error))
            .await
            .map_err(StoreError::from)
    }

    async fn delete_session_rows(
        &self,
        table: &TableName,
        session: &SessionId,
        keep_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let table = table.quoted();
        let session = session.as_str().to_string();
        let keep_id = keep_id.map(str::to_string);
        self.run(move |client| {
            let result = match keep_id {
                Some(keep_id) => client.execute(
                    &format!("DELETE FROM {table} WHERE session = $1 AND id <> $2"),
                    &[&session, &keep_id],
                ),
                None => {
                    client.execute(&format!("DELETE FROM {table} WHERE session = $1"), &[&session])
                }
            };
            result.map_err(pg_error)
        })
        .await
        .map_err(StoreError::from)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || {
            let taken = slot
                .client
                .lock()
                .map_err(|_| PostgresStoreError::Io("postgres mutex poisoned".to_string()))?
                .take();
            match taken {
                Some(client) => client.close().map_err(pg_error),
                None => Ok(()),
            }
        })
        .await
        .map_err(|err| StoreError::Io(format!("postgres task failed: {err}")))?
        .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the quoted name of the session index for `table`.
fn session_index_name(table: &TableName) -> String {
    format!("\"{}_session_idx\"", table.as_str())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
