// crates/pipeline-gate-server/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Server Library
// Description: Tenant-authenticated HTTP boundary for the execution core.
// Purpose: Expose upload, compile, execute, gates, and evidence over axum.
// Dependencies: axum, pipeline-gate-core, pipeline-gate-store-sqlite,
// pipeline-gate-supervisor, toml, tracing
// ============================================================================

//! ## Overview
//! The server wires the durable store, the workspace document store, and an
//! optionally injected model proxy into the seven pipeline routes plus a
//! health probe and an auditor-facing seal verification route. Status codes
//! are stable: 400 bad input, 403 tenant rejected, 404 missing, 503 model
//! proxy unconfigured, 500 internal.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod docstore;
pub mod error;
pub mod routes;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::ServerConfig;
pub use docstore::WorkspaceDocStore;
pub use error::ServerError;
pub use routes::build_router;
pub use state::AppState;
