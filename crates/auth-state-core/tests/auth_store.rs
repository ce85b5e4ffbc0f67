// crates/auth-state-core/tests/auth_store.rs
// ============================================================================
// Module: Auth Store Integration Tests
// Description: End-to-end behavior of the store handle on the memory backend.
// Purpose: Validate bootstrap, key catalogue, lifecycle, and session isolation.
// ============================================================================

//! ## Overview
//! Exercises [`AuthStore`] against [`InMemoryRowBackend`]:
//! - Credential bootstrap on fresh, saved, blank, null, and corrupt rows
//! - Key catalogue set/get/delete and sync key reconstruction
//! - Partial batch failure reporting
//! - Clear/remove lifecycle and session isolation
//! - Audit events and close semantics

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
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use auth_state_core::AppStateSyncKeyData;
use auth_state_core::AppStateSyncKeyFingerprint;
use auth_state_core::AuditEvent;
use auth_state_core::AuditEventKind;
use auth_state_core::AuditOutcome;
use auth_state_core::AuditSink;
use auth_state_core::AuthStore;
use auth_state_core::AuthStoreOptions;
use auth_state_core::CredsSource;
use auth_state_core::InMemoryRowBackend;
use auth_state_core::KeyEntry;
use auth_state_core::KeyPatch;
use auth_state_core::KeyType;
use auth_state_core::LocalKey;
use auth_state_core::Row;
use auth_state_core::RowBackend;
use auth_state_core::RowStore;
use auth_state_core::SessionId;
use auth_state_core::StoreError;
use auth_state_core::TableName;
use auth_state_core::Value;
use auth_state_core::codec;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Helpers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestCreds {
    #[serde(with = "codec::buffer")]
    noise_key: Vec<u8>,
    registration_id: u32,
    #[serde(default)]
    me: Option<String>,
}

fn default_creds() -> TestCreds {
    TestCreds {
        noise_key: vec![1, 2, 3, 250],
        registration_id: 42,
        me: None,
    }
}

fn options(session: &str) -> AuthStoreOptions {
    AuthStoreOptions::new(TableName::default(), SessionId::new(session).expect("session"))
}

async fn open(backend: &InMemoryRowBackend, session: &str) -> AuthStore<TestCreds> {
    AuthStore::open(Arc::new(backend.clone()), options(session), default_creds)
        .await
        .expect("open store")
}

fn patch(key_type: KeyType, id: &str, entry: Option<KeyEntry>) -> KeyPatch {
    BTreeMap::from([(key_type, BTreeMap::from([(id.to_string(), entry)]))])
}

fn sample_key() -> Value {
    Value::Object(BTreeMap::from([
        ("keyPair".to_string(), Value::Bytes(vec![9; 32])),
        ("keyId".to_string(), Value::from(1_i64)),
    ]))
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.lock().expect("events").iter().map(|event| event.event).collect()
    }

    fn last(&self) -> AuditEvent {
        self.events.lock().expect("events").last().cloned().expect("event")
    }
}

impl AuditSink for RecordingSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().expect("events").push(event.clone());
    }
}

/// Backend that fails every upsert once its write budget is spent.
struct BudgetBackend {
    inner: InMemoryRowBackend,
    writes_left: AtomicUsize,
}

#[async_trait]
impl RowBackend for BudgetBackend {
    async fn ensure_table(&self, table: &TableName) -> Result<(), StoreError> {
        self.inner.ensure_table(table).await
    }

    async fn select_row(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError> {
        self.inner.select_row(table, id).await
    }

    async fn upsert_row(&self, table: &TableName, row: &Row) -> Result<(), StoreError> {
        let allowed = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(StoreError::Db("write budget exhausted".to_string()));
        }
        self.inner.upsert_row(table, row).await
    }

    async fn delete_row(&self, table: &TableName, id: &str) -> Result<bool, StoreError> {
        self.inner.delete_row(table, id).await
    }

    async fn delete_session_rows(
        &self,
        table: &TableName,
        session: &SessionId,
        keep_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        self.inner.delete_session_rows(table, session, keep_id).await
    }
}

// ============================================================================
// SECTION: Schema and Bootstrap
// ============================================================================

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let backend = InMemoryRowBackend::new();
    let rows = RowStore::new(
        Arc::new(backend.clone()),
        TableName::default(),
        SessionId::default(),
    );
    rows.ensure_schema().await.expect("first ensure");
    rows.ensure_schema().await.expect("second ensure");
    assert_eq!(backend.table_count().expect("count"), 1);
}

#[tokio::test]
async fn fresh_table_inserts_encoded_default() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    assert_eq!(store.creds(), &default_creds());
    assert_eq!(store.creds_source(), CredsSource::Inserted);

    let row = store.query(store.table(), "creds").await.expect("query").expect("creds row");
    assert_eq!(row.id, "alpha-creds");
    assert_eq!(row.session, "alpha");
    let stored: TestCreds = codec::decode(row.payload().expect("payload")).expect("decode");
    assert_eq!(stored, default_creds());
}

#[tokio::test]
async fn second_store_loads_saved_creds() {
    let backend = InMemoryRowBackend::new();
    let mut first = open(&backend, "alpha").await;
    first.creds_mut().me = Some("alice@device".to_string());
    first.creds_mut().noise_key = vec![0, 255, 17];
    first.save_creds().await.expect("save");

    let second = open(&backend, "alpha").await;
    assert_eq!(second.creds_source(), CredsSource::Loaded);
    assert_eq!(second.creds().me.as_deref(), Some("alice@device"));
    assert_eq!(second.creds().noise_key, vec![0, 255, 17]);
}

#[tokio::test]
async fn unsaved_changes_are_not_persisted() {
    let backend = InMemoryRowBackend::new();
    let mut first = open(&backend, "alpha").await;
    first.set_creds(TestCreds {
        me: Some("bob".to_string()),
        ..default_creds()
    });

    let second = open(&backend, "alpha").await;
    assert_eq!(second.creds(), &default_creds());
}

#[tokio::test]
async fn blank_creds_row_defaults_in_memory_only() {
    let backend = InMemoryRowBackend::new();
    let table = TableName::default();
    backend.ensure_table(&table).await.expect("table");
    let blank = Row {
        id: "alpha-creds".to_string(),
        value: None,
        session: "alpha".to_string(),
    };
    backend.upsert_row(&table, &blank).await.expect("blank row");

    let store = open(&backend, "alpha").await;
    assert_eq!(store.creds_source(), CredsSource::DefaultInMemory);
    assert_eq!(store.creds(), &default_creds());
    let row = store.query(&table, "creds").await.expect("query").expect("row");
    assert_eq!(row.value, None);

    store.save_creds().await.expect("save");
    let row = store.query(&table, "creds").await.expect("query").expect("row");
    assert!(row.payload().is_some());
}

#[tokio::test]
async fn null_creds_payload_defaults_in_memory_only() {
    let backend = InMemoryRowBackend::new();
    let table = TableName::default();
    let rows = RowStore::new(
        Arc::new(backend.clone()),
        table.clone(),
        SessionId::new("alpha").expect("session"),
    );
    rows.ensure_schema().await.expect("schema");
    rows.upsert(&LocalKey::Creds, &Value::Null).await.expect("null creds");

    let store = open(&backend, "alpha").await;
    assert_eq!(store.creds_source(), CredsSource::DefaultInMemory);
    assert_eq!(store.creds(), &default_creds());
    let row = store.query(&table, "creds").await.expect("query").expect("row");
    assert_eq!(row.value.as_deref(), Some("null"));
}

#[tokio::test]
async fn corrupt_creds_row_is_a_hard_error() {
    let backend = InMemoryRowBackend::new();
    let table = TableName::default();
    backend.ensure_table(&table).await.expect("table");
    let corrupt = Row {
        id: "alpha-creds".to_string(),
        value: Some(r#"{"noiseKey":"not a buffer","registrationId":1}"#.to_string()),
        session: "alpha".to_string(),
    };
    backend.upsert_row(&table, &corrupt).await.expect("corrupt row");

    let result: Result<AuthStore<TestCreds>, _> =
        AuthStore::open(Arc::new(backend), options("alpha"), default_creds).await;
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

// ============================================================================
// SECTION: Key Catalogue
// ============================================================================

#[tokio::test]
async fn pre_key_set_get_delete_round_trip() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let keys = store.keys();

    let applied = keys
        .set(&patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key()))))
        .await
        .expect("set");
    assert_eq!(applied, 1);
    let lookup = keys.get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&Some(KeyEntry::Raw(sample_key()))));

    keys.set(&patch(KeyType::PreKey, "1", None)).await.expect("delete");
    let lookup = keys.get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&None));
}

#[tokio::test]
async fn raw_null_entry_deletes_the_row() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let keys = store.keys();
    let table = TableName::default();

    keys.set(&patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key()))))
        .await
        .expect("set");
    assert!(store.query(&table, "pre-key-1").await.expect("query").is_some());

    let applied = keys
        .set(&patch(KeyType::PreKey, "1", Some(KeyEntry::Raw(Value::Null))))
        .await
        .expect("set null");
    assert_eq!(applied, 1);
    assert!(store.query(&table, "pre-key-1").await.expect("query").is_none());
    assert_eq!(store.clear().await.expect("clear"), 0);
}

#[tokio::test]
async fn missing_ids_map_to_none() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let lookup = store.keys().get(KeyType::Session, ["peer.0", "peer.1"]).await.expect("get");
    assert_eq!(lookup.len(), 2);
    assert!(lookup.values().all(Option::is_none));
}

#[tokio::test]
async fn sync_keys_are_reconstructed() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let data = AppStateSyncKeyData {
        key_data: Some(vec![7; 32]),
        fingerprint: Some(AppStateSyncKeyFingerprint {
            raw_id: Some(11),
            current_index: Some(2),
            device_indexes: vec![0, 1],
        }),
        timestamp: Some(1_700_000_000),
    };
    store
        .keys()
        .set(&patch(KeyType::AppStateSyncKey, "AAAAAQ==", Some(KeyEntry::from(data.clone()))))
        .await
        .expect("set");

    let lookup = store.keys().get(KeyType::AppStateSyncKey, ["AAAAAQ=="]).await.expect("get");
    assert_eq!(lookup.get("AAAAAQ=="), Some(&Some(KeyEntry::AppStateSyncKey(data))));
}

#[tokio::test]
async fn malformed_sync_key_is_corrupt_not_absent() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    store
        .keys()
        .set(&patch(KeyType::AppStateSyncKey, "k1", Some(KeyEntry::from(Value::from("junk")))))
        .await
        .expect("set");

    let err = store.keys().get(KeyType::AppStateSyncKey, ["k1"]).await.expect_err("corrupt");
    assert!(matches!(err, StoreError::Corrupt(message) if message.contains("alpha-app-state-sync-key-k1")));
}

#[tokio::test]
async fn undecodable_key_payload_is_corrupt() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let row = Row {
        id: "alpha-sender-key-g1".to_string(),
        value: Some("{broken".to_string()),
        session: "alpha".to_string(),
    };
    backend.upsert_row(store.table(), &row).await.expect("raw write");

    let err = store.keys().get(KeyType::SenderKey, ["g1"]).await.expect_err("corrupt");
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[tokio::test]
async fn invalid_ids_reject_the_whole_batch() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let mut batch = patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key())));
    batch.insert(KeyType::Session, BTreeMap::from([(String::new(), None)]));

    let err = store.keys().set(&batch).await.expect_err("invalid");
    assert!(matches!(err, StoreError::Invalid(_)));
    let lookup = store.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&None));
}

#[tokio::test]
async fn partial_batch_failure_reports_committed_prefix() {
    let backend = BudgetBackend {
        inner: InMemoryRowBackend::new(),
        writes_left: AtomicUsize::new(3),
    };
    let inner = backend.inner.clone();
    let store: AuthStore<TestCreds> =
        AuthStore::open(Arc::new(backend), options("alpha"), default_creds).await.expect("open");

    let entries = (1..=4)
        .map(|id| (id.to_string(), Some(KeyEntry::from(sample_key()))))
        .collect::<BTreeMap<_, _>>();
    let batch = BTreeMap::from([(KeyType::PreKey, entries)]);
    let err = store.keys().set(&batch).await.expect_err("budget exhausted");
    let StoreError::BatchFailed {
        applied,
        total,
        ..
    } = err
    else {
        panic!("expected batch failure, got {err}");
    };
    assert_eq!((applied, total), (2, 4));

    let table = TableName::default();
    assert!(inner.select_row(&table, "alpha-pre-key-1").await.expect("select").is_some());
    assert!(inner.select_row(&table, "alpha-pre-key-2").await.expect("select").is_some());
    assert!(inner.select_row(&table, "alpha-pre-key-3").await.expect("select").is_none());
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn clear_keeps_creds_and_remove_drops_them() {
    let backend = InMemoryRowBackend::new();
    let store = open(&backend, "alpha").await;
    let mut batch = patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key())));
    batch.insert(
        KeyType::SenderKeyMemory,
        BTreeMap::from([("group.1".to_string(), Some(KeyEntry::from(Value::from(true))))]),
    );
    store.keys().set(&batch).await.expect("set");

    assert_eq!(store.clear().await.expect("clear"), 2);
    assert!(store.query(store.table(), "creds").await.expect("query").is_some());
    assert!(store.query(store.table(), "pre-key-1").await.expect("query").is_none());

    assert_eq!(store.remove_creds().await.expect("remove"), 1);
    assert!(store.query(store.table(), "creds").await.expect("query").is_none());
}

#[tokio::test]
async fn sessions_sharing_a_table_are_isolated() {
    let backend = InMemoryRowBackend::new();
    let alpha = open(&backend, "A").await;
    let beta = open(&backend, "B").await;

    alpha
        .keys()
        .set(&patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key()))))
        .await
        .expect("set");
    let lookup = beta.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert_eq!(lookup.get("1"), Some(&None));
    assert!(beta.query(beta.table(), "pre-key-1").await.expect("query").is_none());

    beta.remove_creds().await.expect("remove B");
    assert!(alpha.query(alpha.table(), "creds").await.expect("query").is_some());
    let lookup = alpha.keys().get(KeyType::PreKey, ["1"]).await.expect("get");
    assert!(lookup.get("1").is_some_and(Option::is_some));
}

#[tokio::test]
async fn close_releases_the_backend() {
    let backend = InMemoryRowBackend::new();
    let first = open(&backend, "alpha").await;
    let second = open(&backend, "alpha").await;
    first.close().await.expect("close");
    let err = second.save_creds().await.expect_err("closed");
    assert_eq!(err, StoreError::Closed);
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[tokio::test]
async fn lifecycle_emits_audit_events() {
    let sink = Arc::new(RecordingSink::default());
    let backend = InMemoryRowBackend::new();
    let store: AuthStore<TestCreds> = AuthStore::open(
        Arc::new(backend),
        options("alpha").with_audit(sink.clone()),
        default_creds,
    )
    .await
    .expect("open");
    store
        .keys()
        .set(&patch(KeyType::PreKey, "1", Some(KeyEntry::from(sample_key()))))
        .await
        .expect("set");
    store.keys().get(KeyType::PreKey, ["1", "2"]).await.expect("get");
    let read = sink.last();
    assert_eq!(read.key_type, Some(KeyType::PreKey));
    assert_eq!(read.count, 1);
    store.save_creds().await.expect("save");
    store.clear().await.expect("clear");
    store.remove_creds().await.expect("remove");
    store.close().await.expect("close");

    assert_eq!(
        sink.kinds(),
        vec![
            AuditEventKind::StoreOpened,
            AuditEventKind::CredsBootstrapped,
            AuditEventKind::KeysWritten,
            AuditEventKind::KeysRead,
            AuditEventKind::CredsSaved,
            AuditEventKind::SessionCleared,
            AuditEventKind::SessionRemoved,
            AuditEventKind::StoreClosed,
        ]
    );
    assert_eq!(sink.last().outcome, AuditOutcome::Ok);
}
