// crates/pipeline-gate-server/src/main.rs
// ============================================================================
// Module: Pipeline Gate Server Binary
// Description: Entry point wiring configuration, store, and router.
// Purpose: Serve the pipeline HTTP surface.
// Dependencies: pipeline-gate-server, pipeline-gate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! Boots the server from configuration: structured logging, the SQLite run
//! store, the workspace document store, and the axum router. No model proxy
//! is wired at this entry point; deployments embed the library and inject
//! one, and execution routes answer 503 until then.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use pipeline_gate_server::AppState;
use pipeline_gate_server::ServerConfig;
use pipeline_gate_server::build_router;
use pipeline_gate_store_sqlite::SqliteJournalMode;
use pipeline_gate_store_sqlite::SqliteRunStore;
use pipeline_gate_store_sqlite::SqliteStoreConfig;
use pipeline_gate_supervisor::SystemClock;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Boots the pipeline server.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::load()?;
    tokio::fs::create_dir_all(&config.workspace).await?;

    let store = Arc::new(SqliteRunStore::open(&SqliteStoreConfig {
        path: config.store_path.clone(),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteJournalMode::Wal,
    })?);

    warn!("no model proxy configured; execution routes will answer 503");
    let state = AppState::new(&config, store, None, Arc::new(SystemClock));
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, workspace = %config.workspace.display(), "pipeline gate listening");
    axum::serve(listener, router).await?;
    Ok(())
}
