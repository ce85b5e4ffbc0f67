// crates/auth-state-store-sqlite/tests/sqlite_backend.rs
// ============================================================================
// Module: SQLite Row Backend Tests
// Description: Auth store behavior against an on-disk SQLite database.
// Purpose: Validate schema creation, bootstrap, key catalogue, lifecycle,
//          session isolation, and JSON column constraints.
// ============================================================================

//! ## Overview
//! Integration tests for [`SqliteRowBackend`]:
//! - Path safety and idempotent schema creation
//! - Credential bootstrap and reload across reopened connections
//! - Key catalogue round trips with byte buffers stored as tagged JSON
//! - Clear/remove lifecycle and session isolation in a shared table
//! - Close semantics

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use auth_state_core::AuthStore;
use auth_state_core::AuthStoreOptions;
use auth_state_core::CredsSource;
use auth_state_core::KeyEntry;
use auth_state_core::KeyPatch;
use auth_state_core::KeyType;
use auth_state_core::Row;
use auth_state_core::RowBackend;
use auth_state_core::SessionId;
use auth_state_core::StoreError;
use auth_state_core::TableName;
use auth_state_core::Value;
use auth_state_store_sqlite::SqliteBackendConfig;
use auth_state_store_sqlite::SqliteRowBackend;
use auth_state_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn backend(dir: &TempDir) -> SqliteRowBackend {
    SqliteRowBackend::open(SqliteBackendConfig::new(dir.path().join("auth.db")))
        .expect("open sqlite backend")
}

fn default_creds() -> Value {
    Value::Object(BTreeMap::from([
        ("noiseKey".to_string(), Value::Bytes(vec![1, 2, 3])),
        ("registrationId".to_string(), Value::from(7_i64)),
    ]))
}

async fn open(backend: &SqliteRowBackend, session: &str) -> AuthStore<Value> {
    let options =
        AuthStoreOptions::new(TableName::default(), SessionId::new(session).expect("session"));
    AuthStore::open(Arc::new(backend.clone()), options, default_creds).await.expect("open store")
}

fn pre_key(id: &str, entry: Option<Value>) -> KeyPatch {
    BTreeMap::from([(
        KeyType::PreKey,
        BTreeMap::from([(id.to_string(), entry.map(KeyEntry::from))]),
    )])
}

fn raw_value(path: &Path, id: &str) -> Option<String> {
    let connection = Connection::open(path).expect("raw connection");
    connection
        .query_row("SELECT value FROM amiruldev_auth WHERE id = ?1", [id], |row| row.get(0))
        .expect("raw select")
}

// ============================================================================
// SECTION: Config and Schema
// ============================================================================

#[test]
fn directory_paths_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let result = SqliteRowBackend::open(SqliteBackendConfig::new(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn config_defaults_apply_when_fields_are_omitted() {
    let config: SqliteBackendConfig =
        serde_json::from_str(r#"{"path":"auth.db"}"#).expect("config");
    assert_eq!(config, SqliteBackendConfig::new("auth.db"));
}

#[tokio::test]
async fn ensure_table_is_idempotent() {
    let dir = TempDir::new().expect("tempdir");
    let backend = backend(&dir);
    let table = TableName::default();
    backend.ensure_table(&table).await.expect("first");
    backend.ensure_table(&table).await.expect("second");

    let connection = Connection::open(dir.path().join("auth.db")).expect("raw connection");
    let count: i64 = connection
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table.as_str()],
            |row| row.get(0),
        )
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn value_column_rejects_non_json() {
    let dir = TempDir::new().expect("tempdir");
    let backend = backend(&dir);
    let table = TableName::default();
    backend.ensure_table(&table).await.expect("table");
    let row = Row {
        id: "alpha-pre-key-1".to_string(),
        value: Some("{not json".to_string()),
        session: "alpha".to_string(),
    };
    let err = backend.upsert_row(&table, &row).await.expect_err("check constraint");
    assert!(matches!(err, StoreError::Db(_)));
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[tokio::test]
async fn fresh_database_bootstraps_encoded_default() {
    let dir = TempDir::new().expect("tempdir");
    let backend = backend(&dir);
    let store = open(&backend, "alpha").await;
    assert_eq!(store.creds(), &default_creds());
    assert_eq!(store.creds_source(), CredsSource::Inserted);

    let stored = raw_value(&dir.path().join("auth.db"), "alpha-creds").expect("creds value");
    let json: serde_json::Value = serde_json::from_str(&stored).expect("json");
    assert_eq!(json["noiseKey"], serde_json::json!({"type": "Buffer", "data": "AQID"}));
}

#[tokio::test]
async fn reopened_database_returns_saved_creds() {
    let dir = TempDir::new().expect("tempdir");
    {
        let mut store = open(&backend(&dir), "alpha").await;
        let Value::Object(fields) = store.creds_mut() else {
            panic!("creds should be an object");
        };
        fields.insert("me".to_string(), Value::from("alice"));
        store.save_creds().await.expect("save");
        store.close().await.expect("close");
    }

    let store = open(&backend(&dir), "alpha").await;
    assert_eq!(store.creds_source(), CredsSource::Loaded);
    assert_eq!(store.creds().get("me"), Some(&Value::from("alice")));
    assert_eq!(store.creds().get("noiseKey"), Some(&Value::Bytes(vec![1, 2, 3])));
}

// ============================================================================
// SECTION: Key Catalogue and Lifecycle
// ============================================================================

#[tokio::test]
async fn pre_key_round_trip_and_delete() {
    let dir = TempDir::new().expect("tempdir");
    let store = open(&backend(&dir), "alpha").await;
    let key = Value::Object(BTreeMap::from([
        ("public".to_string(), Value::Bytes(vec![5; 32])),
        ("private".to_string(), Value::Bytes(vec![6; 32])),
    ]));

    store.keys().set(&pre_key("1", Some(key.clone()))).await.expect("set");
    let lookup = store.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&Some(KeyEntry::Raw(key))));

    store.keys().set(&pre_key("1", None)).await.expect("delete");
    let lookup = store.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&None));
}

#[tokio::test]
async fn upsert_overwrites_in_place() {
    let dir = TempDir::new().expect("tempdir");
    let store = open(&backend(&dir), "alpha").await;
    store.keys().set(&pre_key("1", Some(Value::from("first")))).await.expect("set");
    store.keys().set(&pre_key("1", Some(Value::from("second")))).await.expect("set");

    let stored = raw_value(&dir.path().join("auth.db"), "alpha-pre-key-1");
    assert_eq!(stored.as_deref(), Some("\"second\""));
}

#[tokio::test]
async fn clear_and_remove_respect_creds() {
    let dir = TempDir::new().expect("tempdir");
    let store = open(&backend(&dir), "alpha").await;
    store.keys().set(&pre_key("1", Some(Value::from(1_i64)))).await.expect("set");
    store.keys().set(&pre_key("2", Some(Value::from(2_i64)))).await.expect("set");

    assert_eq!(store.clear().await.expect("clear"), 2);
    assert!(store.query(store.table(), "creds").await.expect("query").is_some());
    assert_eq!(store.remove_creds().await.expect("remove"), 1);
    assert!(store.query(store.table(), "creds").await.expect("query").is_none());
}

#[tokio::test]
async fn sessions_in_one_table_are_isolated() {
    let dir = TempDir::new().expect("tempdir");
    let shared = backend(&dir);
    let alpha = open(&shared, "A").await;
    let beta = open(&shared, "B").await;

    alpha.keys().set(&pre_key("1", Some(Value::from("a-only")))).await.expect("set");
    let lookup = beta.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&None));

    beta.clear().await.expect("clear B");
    let lookup = alpha.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&Some(KeyEntry::Raw(Value::from("a-only")))));
}

#[tokio::test]
async fn closed_backend_reports_closed() {
    let dir = TempDir::new().expect("tempdir");
    let shared = backend(&dir);
    let store = open(&shared, "alpha").await;
    store.close().await.expect("close");
    let err = shared.select_row(&TableName::default(), "alpha-creds").await.expect_err("closed");
    assert_eq!(err, StoreError::Closed);
}
