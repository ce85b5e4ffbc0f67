// crates/auth-state-store-postgres/src/lib.rs
// ============================================================================
// Module: Postgres Row Backend
// Description: Shared-database RowBackend using the blocking Postgres client.
// Purpose: Let many processes and sessions share one auth state table.
// Dependencies: auth-state-core, postgres, tokio
// ============================================================================

//! ## Overview
//! This crate provides a Postgres-backed [`auth_state_core::RowBackend`] that
//! stores values in a `JSONB` column. One client connection serves every
//! statement; there is no pool.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::PostgresBackendConfig;
pub use store::PostgresRowBackend;
pub use store::PostgresStoreError;
