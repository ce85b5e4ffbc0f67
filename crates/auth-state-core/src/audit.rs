// crates/auth-state-core/src/audit.rs
// ============================================================================
// Module: Auth State Audit
// Description: Structured audit events for store lifecycle and key batches.
// Purpose: Emit JSON-line records without ever logging stored payloads.
// Dependencies: serde, serde_json, crate::core
// ============================================================================

//! ## Overview
//! Every lifecycle step of an [`crate::AuthStore`] emits one [`AuditEvent`]
//! through an [`AuditSink`]. Events carry the table, session, key category,
//! and counts only. Sinks swallow write failures so auditing never breaks a
//! store operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

use crate::core::KeyType;
use crate::core::SessionId;
use crate::core::TableName;

// ============================================================================
// SECTION: Events
// ============================================================================

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Store handle opened and schema ensured.
    StoreOpened,
    /// Credentials resolved during open.
    CredsBootstrapped,
    /// Cached credentials persisted.
    CredsSaved,
    /// Key catalogue read.
    KeysRead,
    /// Key catalogue batch applied.
    KeysWritten,
    /// Non-credential rows of the session deleted.
    SessionCleared,
    /// Every row of the session deleted.
    SessionRemoved,
    /// Backend connection released.
    StoreClosed,
}

impl AuditEventKind {
    /// Returns the stable event label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StoreOpened => "store_opened",
            Self::CredsBootstrapped => "creds_bootstrapped",
            Self::CredsSaved => "creds_saved",
            Self::KeysRead => "keys_read",
            Self::KeysWritten => "keys_written",
            Self::SessionCleared => "session_cleared",
            Self::SessionRemoved => "session_removed",
            Self::StoreClosed => "store_closed",
        }
    }
}

/// Audit outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Operation completed.
    Ok,
    /// Operation failed.
    Error,
}

/// Audit record for one store operation.
///
/// # Invariants
/// - Never contains credential or key payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    /// Event kind.
    pub event: AuditEventKind,
    /// Wall-clock timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Table name.
    pub table: String,
    /// Session tag.
    pub session: String,
    /// Key category for catalogue events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<KeyType>,
    /// Rows or entries touched.
    pub count: u64,
    /// Operation outcome.
    pub outcome: AuditOutcome,
    /// Error message when the operation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    /// Builds a successful event with a zero count.
    #[must_use]
    pub fn new(event: AuditEventKind, table: &TableName, session: &SessionId) -> Self {
        Self {
            event,
            timestamp_ms: now_millis(),
            table: table.as_str().to_string(),
            session: session.as_str().to_string(),
            key_type: None,
            count: 0,
            outcome: AuditOutcome::Ok,
            error: None,
        }
    }

    /// Attaches the key category.
    #[must_use]
    pub const fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    /// Sets the affected count.
    #[must_use]
    pub const fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Marks the event as failed.
    #[must_use]
    pub fn failed(mut self, error: impl ToString) -> Self {
        self.outcome = AuditOutcome::Error;
        self.error = Some(error.to_string());
        self
    }
}

/// Returns the current time in milliseconds, or zero before the epoch.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis())
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink writing JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let mut stderr = std::io::stderr();
            let _ = writeln!(&mut stderr, "{payload}");
        }
    }
}

/// Audit sink appending JSON lines to a file.
pub struct FileAuditSink {
    /// Open file handle for appending audit events.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens or creates the audit log file.
    ///
    /// # Errors
    ///
    /// Returns [`std::io::Error`] when the file cannot be opened.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::expect_used, reason = "Unit tests use expect for setup clarity.")]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_without_empty_optionals() {
        let event = AuditEvent::new(
            AuditEventKind::CredsSaved,
            &TableName::default(),
            &SessionId::default(),
        );
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "creds_saved");
        assert_eq!(json["outcome"], "ok");
        assert!(json.get("key_type").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failed_event_carries_key_type_and_error() {
        let event = AuditEvent::new(
            AuditEventKind::KeysWritten,
            &TableName::default(),
            &SessionId::default(),
        )
        .with_key_type(KeyType::SenderKey)
        .with_count(3)
        .failed("boom");
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["key_type"], "sender-key");
        assert_eq!(json["count"], 3);
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).expect("sink");
        let event =
            AuditEvent::new(AuditEventKind::StoreOpened, &TableName::default(), &SessionId::default());
        sink.record(&event);
        sink.record(&event.clone().with_count(1));
        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }
}
