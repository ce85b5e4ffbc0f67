// crates/auth-state-core/src/lib.rs
// ============================================================================
// Module: Auth State Core Library
// Description: Public API surface for session-partitioned auth state storage.
// Purpose: Expose core types, the backend interface, and the store handle.
// Dependencies: crate::{audit, core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Auth state core persists a protocol client's long-lived credentials and
//! rotating key material in one relational table shared by many sessions.
//! Rows are namespaced as `{session}-{local_key}`, values round-trip through
//! a JSON codec that preserves byte buffers, and drivers plug in through the
//! [`RowBackend`] trait.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use audit::AuditEvent;
pub use audit::AuditEventKind;
pub use audit::AuditOutcome;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use interfaces::Row;
pub use interfaces::RowBackend;
pub use interfaces::SharedRowBackend;
pub use interfaces::StoreError;
pub use runtime::AuthStore;
pub use runtime::AuthStoreOptions;
pub use runtime::CredsSource;
pub use runtime::InMemoryRowBackend;
pub use runtime::KeyCatalogue;
pub use runtime::KeyLookup;
pub use runtime::RowStore;
