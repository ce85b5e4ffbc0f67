// crates/auth-state-core/src/runtime/mod.rs
// ============================================================================
// Module: Auth State Runtime
// Description: Session row store, key catalogue, and store handle.
// Purpose: Implement the session-partitioned key-value behavior over any backend.
// Dependencies: crate::{audit, core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules layer session scoping, encoding, credential bootstrap, and
//! batched key access on top of a [`crate::RowBackend`]. Every backend goes
//! through the same code here, so behavior is identical across drivers.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod auth;
pub mod keys;
pub mod rows;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthStore;
pub use auth::AuthStoreOptions;
pub use auth::CredsSource;
pub use keys::KeyCatalogue;
pub use keys::KeyLookup;
pub use rows::RowStore;
pub use store::InMemoryRowBackend;
