// crates/auth-state-core/src/runtime/auth.rs
// ============================================================================
// Module: Auth Store Handle
// Description: Credential bootstrap and lifecycle operations for one session.
// Purpose: Expose the store handle consumed by the protocol client.
// Dependencies: serde, crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! [`AuthStore::open`] walks the handle lifecycle once: ensure the schema,
//! then resolve the `creds` row. A missing row is inserted with the encoded
//! default; a row with a blank or JSON `null` payload falls back to the
//! default in memory only. The resolved credentials are cached for the life of the handle and
//! persisted again only by [`AuthStore::save_creds`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::audit::AuditEvent;
use crate::audit::AuditEventKind;
use crate::audit::AuditSink;
use crate::audit::NoopAuditSink;
use crate::core::CREDS_KEY;
use crate::core::LocalKey;
use crate::core::SessionId;
use crate::core::TableName;
use crate::core::codec;
use crate::interfaces::Row;
use crate::interfaces::SharedRowBackend;
use crate::interfaces::StoreError;
use crate::runtime::keys::KeyCatalogue;
use crate::runtime::rows::RowStore;

// ============================================================================
// SECTION: Options
// ============================================================================

/// Construction options for [`AuthStore::open`].
#[derive(Clone)]
pub struct AuthStoreOptions {
    /// Table shared by every session.
    pub table: TableName,
    /// Session partition tag.
    pub session: SessionId,
    /// Audit sink for lifecycle events.
    pub audit: Arc<dyn AuditSink>,
}

impl AuthStoreOptions {
    /// Builds options with the no-op audit sink.
    #[must_use]
    pub fn new(table: TableName, session: SessionId) -> Self {
        Self {
            table,
            session,
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

impl Default for AuthStoreOptions {
    fn default() -> Self {
        Self::new(TableName::default(), SessionId::default())
    }
}

/// How the credentials were resolved during open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredsSource {
    /// No row existed; the encoded default was inserted.
    Inserted,
    /// The stored payload was decoded.
    Loaded,
    /// The row existed with a blank or `null` payload; the default lives in memory only.
    DefaultInMemory,
}

// ============================================================================
// SECTION: Auth Store
// ============================================================================

/// Open store handle for one session.
///
/// # Invariants
/// - Construction completed schema creation and credential bootstrap.
/// - `creds` is the only cached state; key rows are always read through.
pub struct AuthStore<C> {
    /// Session row store.
    rows: RowStore,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Cached credentials.
    creds: C,
    /// How the credentials were resolved.
    creds_source: CredsSource,
}

impl<C> AuthStore<C>
where
    C: Serialize + DeserializeOwned + Send + Sync,
{
    /// Opens a store handle, creating the schema and bootstrapping `creds`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when schema creation or the credential read
    /// fails, and [`StoreError::Corrupt`] when the stored credentials cannot
    /// be decoded.
    pub async fn open<F>(
        backend: SharedRowBackend,
        options: AuthStoreOptions,
        default_creds: F,
    ) -> Result<Self, StoreError>
    where
        F: FnOnce() -> C + Send,
    {
        let AuthStoreOptions {
            table,
            session,
            audit,
        } = options;
        let rows = RowStore::new(backend, table, session);
        let opened = AuditEvent::new(AuditEventKind::StoreOpened, rows.table(), rows.session());
        if let Err(err) = rows.ensure_schema().await {
            audit.record(&opened.failed(&err));
            return Err(err);
        }
        audit.record(&opened);

        let bootstrapped =
            AuditEvent::new(AuditEventKind::CredsBootstrapped, rows.table(), rows.session());
        match bootstrap_creds(&rows, default_creds).await {
            Ok((creds, creds_source)) => {
                let written = u64::from(creds_source == CredsSource::Inserted);
                audit.record(&bootstrapped.with_count(written));
                Ok(Self {
                    rows,
                    audit,
                    creds,
                    creds_source,
                })
            }
            Err(err) => {
                audit.record(&bootstrapped.failed(&err));
                Err(err)
            }
        }
    }

    /// Returns the cached credentials.
    #[must_use]
    pub const fn creds(&self) -> &C {
        &self.creds
    }

    /// Returns the cached credentials for mutation; call [`Self::save_creds`] to persist.
    pub const fn creds_mut(&mut self) -> &mut C {
        &mut self.creds
    }

    /// Replaces the cached credentials without persisting them.
    pub fn set_creds(&mut self, creds: C) {
        self.creds = creds;
    }

    /// Returns how the credentials were resolved during open.
    #[must_use]
    pub const fn creds_source(&self) -> CredsSource {
        self.creds_source
    }

    /// Returns the key catalogue for this session.
    #[must_use]
    pub fn keys(&self) -> KeyCatalogue<'_> {
        KeyCatalogue::new(&self.rows, self.audit.as_ref())
    }

    /// Returns the session tag.
    #[must_use]
    pub const fn session(&self) -> &SessionId {
        self.rows.session()
    }

    /// Returns the table name.
    #[must_use]
    pub const fn table(&self) -> &TableName {
        self.rows.table()
    }

    /// Encodes the cached credentials and upserts the `creds` row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the credentials cannot be encoded,
    /// or the backend error when the write fails.
    pub async fn save_creds(&self) -> Result<(), StoreError> {
        let result = self.write_creds().await;
        self.record(AuditEventKind::CredsSaved, result.as_ref().map(|_| 1));
        result
    }

    /// Deletes every row of the session except `creds`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub async fn clear(&self) -> Result<u64, StoreError> {
        let result = self.rows.delete_all_in_session(true).await;
        self.record(AuditEventKind::SessionCleared, result.as_ref().copied());
        result
    }

    /// Deletes every row of the session, `creds` included.
    ///
    /// The cached credentials stay in memory; a later [`Self::save_creds`]
    /// writes them back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    pub async fn remove_creds(&self) -> Result<u64, StoreError> {
        let result = self.rows.delete_all_in_session(false).await;
        self.record(AuditEventKind::SessionRemoved, result.as_ref().copied());
        result
    }

    /// Reads the raw row `{session}-{id}` from `table`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails. Absence is `Ok(None)`.
    pub async fn query(&self, table: &TableName, id: &str) -> Result<Option<Row>, StoreError> {
        self.rows.query_row(table, id).await
    }

    /// Releases the backend connection and consumes the handle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend cannot be closed cleanly.
    pub async fn close(self) -> Result<(), StoreError> {
        let result = self.rows.backend().close().await;
        self.record(AuditEventKind::StoreClosed, result.as_ref().map(|_| 0));
        result
    }

    /// Encodes and writes the cached credentials.
    async fn write_creds(&self) -> Result<(), StoreError> {
        let encoded = codec::encode(&self.creds)
            .map_err(|err| StoreError::Invalid(format!("{CREDS_KEY}: {err}")))?;
        self.rows.upsert_encoded(&LocalKey::Creds, encoded).await
    }

    /// Records a lifecycle event for an operation result.
    fn record(&self, kind: AuditEventKind, result: Result<u64, &StoreError>) {
        let event = AuditEvent::new(kind, self.rows.table(), self.rows.session());
        let event = match result {
            Ok(count) => event.with_count(count),
            Err(err) => event.failed(err),
        };
        self.audit.record(&event);
    }
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Resolves the session credentials, inserting the encoded default when absent.
async fn bootstrap_creds<C, F>(
    rows: &RowStore,
    default_creds: F,
) -> Result<(C, CredsSource), StoreError>
where
    C: Serialize + DeserializeOwned,
    F: FnOnce() -> C,
{
    let row = rows.query_row(rows.table(), CREDS_KEY).await?;
    match row {
        None => {
            let creds = default_creds();
            let encoded = codec::encode(&creds)
                .map_err(|err| StoreError::Invalid(format!("{CREDS_KEY}: {err}")))?;
            rows.upsert_encoded(&LocalKey::Creds, encoded).await?;
            Ok((creds, CredsSource::Inserted))
        }
        Some(row) => {
            let Some(text) = row.payload() else {
                return Ok((default_creds(), CredsSource::DefaultInMemory));
            };
            let value = codec::decode_value(text)
                .map_err(|err| StoreError::Corrupt(format!("{}: {err}", row.id)))?;
            if value.is_null() {
                return Ok((default_creds(), CredsSource::DefaultInMemory));
            }
            let creds = value
                .into_typed()
                .map_err(|err| StoreError::Corrupt(format!("{}: {err}", row.id)))?;
            Ok((creds, CredsSource::Loaded))
        }
    }
}
