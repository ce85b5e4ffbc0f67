// crates/auth-state-config/src/config.rs
// ============================================================================
// Module: Auth State Configuration
// Description: Configuration loading and validation for auth state stores.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: auth-state-core, auth-state-store-{sqlite,postgres}, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The path comes from the caller, then `AUTH_STATE_CONFIG`, then
//! `auth-state.toml` in the working directory. Every field has a default, so
//! an empty file yields a SQLite store at `auth-state.db` with the default
//! table and session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use auth_state_core::AuditSink;
use auth_state_core::DEFAULT_SESSION_ID;
use auth_state_core::DEFAULT_TABLE_NAME;
use auth_state_core::FileAuditSink;
use auth_state_core::NoopAuditSink;
use auth_state_core::SessionId;
use auth_state_core::SharedRowBackend;
use auth_state_core::StderrAuditSink;
use auth_state_core::StoreError;
use auth_state_core::TableName;
use auth_state_store_postgres::PostgresBackendConfig;
use auth_state_store_postgres::PostgresRowBackend;
use auth_state_store_sqlite::SqliteBackendConfig;
use auth_state_store_sqlite::SqliteRowBackend;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "auth-state.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "AUTH_STATE_CONFIG";
/// Default `SQLite` database path.
const DEFAULT_SQLITE_PATH: &str = "auth-state.db";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Top-level auth state configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateConfig {
    /// Table shared by every session.
    #[serde(default = "default_table")]
    pub table: String,
    /// Session partition tag.
    #[serde(default = "default_session")]
    pub session: String,
    /// Row backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for AuthStateConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            session: default_session(),
            backend: BackendConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Row backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Local `SQLite` database file.
    Sqlite(SqliteBackendConfig),
    /// Postgres server.
    Postgres(PostgresBackendConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteBackendConfig::new(DEFAULT_SQLITE_PATH))
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard events.
    None,
}

/// Audit configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Output path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl AuthStateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table_name()?;
        self.session_id()?;
        self.backend.validate()?;
        self.audit.validate()
    }

    /// Returns the validated table name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the table name is malformed.
    pub fn table_name(&self) -> Result<TableName, ConfigError> {
        TableName::new(self.table.clone()).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Returns the validated session id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the session id is malformed.
    pub fn session_id(&self) -> Result<SessionId, ConfigError> {
        SessionId::new(self.session.clone()).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Builds the configured row backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database cannot be opened.
    pub async fn connect_backend(&self) -> Result<SharedRowBackend, StoreError> {
        match &self.backend {
            BackendConfig::Sqlite(config) => {
                let backend = SqliteRowBackend::open(config.clone())?;
                Ok(Arc::new(backend))
            }
            BackendConfig::Postgres(config) => {
                let backend = PostgresRowBackend::connect(config).await?;
                Ok(Arc::new(backend))
            }
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the audit file cannot be opened and
    /// [`ConfigError::Invalid`] when the file sink has no path.
    pub fn audit_sink(&self) -> Result<Arc<dyn AuditSink>, ConfigError> {
        match self.audit.sink {
            AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkKind::File => {
                let path = self.audit.path.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("audit.path is required for the file sink".to_string())
                })?;
                let sink =
                    FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }
}

// ============================================================================
// SECTION: Validation
// ============================================================================

impl BackendConfig {
    /// Validates backend settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sqlite(config) => {
                validate_path_string("backend.path", &config.path.to_string_lossy())?;
                if config.busy_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "backend.busy_timeout_ms must be greater than zero".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Postgres(config) => {
                config.validate().map_err(|err| ConfigError::Invalid(err.to_string()))
            }
        }
    }
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkKind::File, None) => Err(ConfigError::Invalid(
                "audit.path is required for the file sink".to_string(),
            )),
            (AuditSinkKind::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the default table name.
fn default_table() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

/// Returns the default session id.
fn default_session() -> String {
    DEFAULT_SESSION_ID.to_string()
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a configured path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
