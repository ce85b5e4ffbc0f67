// crates/auth-state-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Row Backend
// Description: Durable RowBackend using SQLite WAL.
// Purpose: Persist session-partitioned auth state in a local database file.
// Dependencies: auth-state-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`auth_state_core::RowBackend`]. One
//! connection serves every statement; blocking calls run on the tokio
//! blocking pool so async callers are never stalled. The `value` column is
//! constrained to valid JSON.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteBackendConfig;
pub use store::SqliteRowBackend;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
