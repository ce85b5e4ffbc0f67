// crates/auth-state-config/src/lib.rs
// ============================================================================
// Module: Auth State Config
// Description: Configuration model and loading for auth state stores.
// Purpose: Resolve table, session, backend, and audit settings from TOML.
// Dependencies: auth-state-core, auth-state-store-{sqlite,postgres}, serde, toml
// ============================================================================

//! ## Overview
//! [`AuthStateConfig`] is the canonical configuration model. It loads from a
//! size-bounded TOML file, validates identifiers and backend settings, and
//! builds the configured [`auth_state_core::RowBackend`] and
//! [`auth_state_core::AuditSink`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::AuthStateConfig;
pub use config::BackendConfig;
pub use config::ConfigError;
