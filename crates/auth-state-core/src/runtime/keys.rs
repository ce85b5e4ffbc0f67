// crates/auth-state-core/src/runtime/keys.rs
// ============================================================================
// Module: Key Catalogue Adapter
// Description: Batched get/set over typed key identifiers.
// Purpose: Map catalogue entries onto session rows with per-category reconstruction.
// Dependencies: crate::{audit, core, interfaces, runtime::rows}
// ============================================================================

//! ## Overview
//! [`KeyCatalogue`] reads each requested id with one statement and applies
//! [`KeyType::reconstruct`] to every stored value. Writes are applied one
//! entry at a time in patch order. Batches are not transactional: a failure
//! reports how many entries were committed before it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::audit::AuditEvent;
use crate::audit::AuditEventKind;
use crate::audit::AuditSink;
use crate::core::KeyEntry;
use crate::core::KeyPatch;
use crate::core::KeyType;
use crate::core::LocalKey;
use crate::core::Value;
use crate::core::codec;
use crate::interfaces::StoreError;
use crate::runtime::rows::RowStore;

// ============================================================================
// SECTION: Key Catalogue
// ============================================================================

/// Result of a catalogue read: every requested id maps to its entry or `None`.
pub type KeyLookup = BTreeMap<String, Option<KeyEntry>>;

/// Key catalogue view borrowed from an open store.
pub struct KeyCatalogue<'a> {
    /// Session row store.
    rows: &'a RowStore,
    /// Audit sink for read and write events.
    audit: &'a dyn AuditSink,
}

impl<'a> KeyCatalogue<'a> {
    /// Creates a catalogue view over a row store.
    #[must_use]
    pub fn new(rows: &'a RowStore, audit: &'a dyn AuditSink) -> Self {
        Self {
            rows,
            audit,
        }
    }

    /// Reads entries of one category.
    ///
    /// Missing rows and rows with blank payloads map to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for malformed ids,
    /// [`StoreError::Corrupt`] when a stored payload cannot be decoded or
    /// reconstructed, and backend errors as-is.
    pub async fn get<I, S>(&self, key_type: KeyType, ids: I) -> Result<KeyLookup, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let result = self.read_entries(key_type, ids).await;
        let event =
            AuditEvent::new(AuditEventKind::KeysRead, self.rows.table(), self.rows.session())
                .with_key_type(key_type);
        match &result {
            Ok(lookup) => {
                let found = lookup.values().filter(|entry| entry.is_some()).count();
                self.audit.record(&event.with_count(count_u64(found)));
            }
            Err(err) => self.audit.record(&event.failed(err)),
        }
        result
    }

    /// Applies a patch: `Some` upserts, while `None` or a raw `null` deletes.
    ///
    /// Every id is validated before anything is written. Returns the number of
    /// entries applied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when an id is malformed (nothing is
    /// written), or [`StoreError::BatchFailed`] when a write fails partway.
    pub async fn set(&self, patch: &KeyPatch) -> Result<usize, StoreError> {
        let result = self.apply_patch(patch).await;
        let event =
            AuditEvent::new(AuditEventKind::KeysWritten, self.rows.table(), self.rows.session());
        match &result {
            Ok(applied) => self.audit.record(&event.with_count(count_u64(*applied))),
            Err(err) => {
                let applied = match err {
                    StoreError::BatchFailed {
                        applied,
                        ..
                    } => *applied,
                    _ => 0,
                };
                self.audit.record(&event.with_count(count_u64(applied)).failed(err));
            }
        }
        result
    }

    /// Reads and reconstructs each requested id.
    async fn read_entries<I, S>(&self, key_type: KeyType, ids: I) -> Result<KeyLookup, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lookup = KeyLookup::new();
        for id in ids {
            let id = id.into();
            let local_key = LocalKey::key(key_type, id.clone())?;
            let row = self.rows.query_row(self.rows.table(), &local_key.to_string()).await?;
            let entry = match row.as_ref().and_then(|row| row.payload()) {
                None => None,
                Some(text) => {
                    let row_id = self.rows.row_id(&local_key);
                    let value = codec::decode_value(text)
                        .map_err(|err| StoreError::Corrupt(format!("{row_id}: {err}")))?;
                    if value.is_null() {
                        None
                    } else {
                        let entry = key_type
                            .reconstruct(value)
                            .map_err(|err| StoreError::Corrupt(format!("{row_id}: {err}")))?;
                        Some(entry)
                    }
                }
            };
            lookup.insert(id, entry);
        }
        Ok(lookup)
    }

    /// Validates every id, then applies entries in order.
    async fn apply_patch(&self, patch: &KeyPatch) -> Result<usize, StoreError> {
        let mut planned = Vec::new();
        for (key_type, entries) in patch {
            for (id, entry) in entries {
                planned.push((LocalKey::key(*key_type, id.clone())?, entry.as_ref()));
            }
        }
        let total = planned.len();
        for (applied, (local_key, entry)) in planned.into_iter().enumerate() {
            let outcome = match entry {
                None | Some(KeyEntry::Raw(Value::Null)) => {
                    self.rows.delete(&local_key).await.map(|_| ())
                }
                Some(entry) => self.write_entry(&local_key, entry).await,
            };
            if let Err(err) = outcome {
                return Err(StoreError::BatchFailed {
                    applied,
                    total,
                    message: format!("{local_key}: {err}"),
                });
            }
        }
        Ok(total)
    }

    /// Encodes and upserts one entry.
    async fn write_entry(&self, local_key: &LocalKey, entry: &KeyEntry) -> Result<(), StoreError> {
        let value = entry
            .to_value()
            .map_err(|err| StoreError::Invalid(format!("{local_key}: {err}")))?;
        self.rows.upsert(local_key, &value).await
    }
}

/// Converts a count to `u64` for audit records.
fn count_u64(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}
