// crates/auth-state-cli/src/main.rs
// ============================================================================
// Module: Auth State CLI Entry Point
// Description: Command dispatcher for auth state store maintenance.
// Purpose: Bootstrap, inspect, and reset sessions from the command line.
// Dependencies: auth-state-config, auth-state-core, clap, serde_json, tokio
// ============================================================================

//! ## Overview
//! `auth-state` opens the store described by the configuration file and runs
//! one maintenance command against the configured session. Credentials are
//! handled as opaque JSON; key payloads are never printed except through an
//! explicit `query`.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use auth_state_config::AuthStateConfig;
use auth_state_core::AuthStore;
use auth_state_core::AuthStoreOptions;
use auth_state_core::CredsSource;
use auth_state_core::TableName;
use auth_state_core::Value;
use clap::Parser;
use clap::Subcommand;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "auth-state", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `AUTH_STATE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the table and bootstrap the session credentials.
    Init,
    /// Print one raw row of the session as JSON, or `null`.
    Query {
        /// Local key, such as `creds` or `pre-key-1`.
        #[arg(long, value_name = "LOCAL_KEY")]
        id: String,
        /// Table to read instead of the configured one.
        #[arg(long, value_name = "NAME")]
        table: Option<String>,
    },
    /// Delete every session row except the credentials.
    Clear,
    /// Delete every session row including the credentials.
    Remove,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for printable error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    let config = AuthStateConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    let store = open_store(&config).await?;
    let outcome = match cli.command {
        Commands::Init => Ok(json!({
            "table": store.table().as_str(),
            "session": store.session().as_str(),
            "creds": creds_source_label(store.creds_source()),
        })),
        Commands::Query {
            id,
            table,
        } => command_query(&store, &id, table).await,
        Commands::Clear => store.clear().await.map(|removed| json!({ "removed": removed })),
        Commands::Remove => store.remove_creds().await.map(|removed| json!({ "removed": removed })),
    };
    let closed = store.close().await;
    let output = outcome.map_err(|err| CliError::new(err.to_string()))?;
    closed.map_err(|err| CliError::new(err.to_string()))?;
    write_stdout_line(&output.to_string())
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Opens the configured store with empty default credentials.
async fn open_store(config: &AuthStateConfig) -> CliResult<AuthStore<Value>> {
    let table = config.table_name().map_err(|err| CliError::new(err.to_string()))?;
    let session = config.session_id().map_err(|err| CliError::new(err.to_string()))?;
    let audit = config.audit_sink().map_err(|err| CliError::new(err.to_string()))?;
    let backend = config.connect_backend().await.map_err(|err| CliError::new(err.to_string()))?;
    let options = AuthStoreOptions::new(table, session).with_audit(audit);
    AuthStore::open(backend, options, default_creds)
        .await
        .map_err(|err| CliError::new(err.to_string()))
}

/// Reads one raw row and renders it as JSON.
async fn command_query(
    store: &AuthStore<Value>,
    id: &str,
    table: Option<String>,
) -> Result<serde_json::Value, auth_state_core::StoreError> {
    let table = match table {
        Some(name) => TableName::new(name)?,
        None => store.table().clone(),
    };
    let row = store.query(&table, id).await?;
    serde_json::to_value(row).map_err(|err| auth_state_core::StoreError::Invalid(err.to_string()))
}

/// Returns the credentials written for a fresh session.
fn default_creds() -> Value {
    Value::Object(BTreeMap::new())
}

/// Returns the stable label for a credential source.
const fn creds_source_label(source: CredsSource) -> &'static str {
    match source {
        CredsSource::Inserted => "inserted",
        CredsSource::Loaded => "loaded",
        CredsSource::DefaultInMemory => "default_in_memory",
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
