// crates/pipeline-gate-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Shared application state for the HTTP surface.
// Purpose: Wire the store, documents, model proxy, and clock into handlers.
// Dependencies: pipeline-gate-core, pipeline-gate-store-sqlite
// ============================================================================

//! ## Overview
//! The application state carries the durable store, the workspace document
//! store, the optional model proxy, and the clock. The model proxy is
//! optional by design: the server boots without one and execution routes
//! answer 503 until a proxy is injected by the embedding deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use pipeline_gate_core::Clock;
use pipeline_gate_core::ModelProxy;
use pipeline_gate_store_sqlite::SqliteRunStore;
use pipeline_gate_supervisor::ExecutionConfig;

use crate::config::ServerConfig;
use crate::docstore::WorkspaceDocStore;
use crate::error::ServerError;

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Durable run state authority.
    pub store: Arc<SqliteRunStore>,
    /// Document store over the workspace.
    pub documents: Arc<WorkspaceDocStore>,
    /// Optional vendor model proxy.
    pub model: Option<Arc<dyn ModelProxy>>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Workspace root directory.
    pub workspace: PathBuf,
}

impl AppState {
    /// Builds state from configuration plus injected capabilities.
    #[must_use]
    pub fn new(
        config: &ServerConfig,
        store: Arc<SqliteRunStore>,
        model: Option<Arc<dyn ModelProxy>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let documents =
            Arc::new(WorkspaceDocStore::new(store.clone(), config.workspace.clone()));
        Self {
            store,
            documents,
            model,
            clock,
            workspace: config.workspace.clone(),
        }
    }

    /// Builds the supervisor execution config, requiring a model proxy.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ModelUnconfigured`] when no proxy is wired.
    pub fn execution_config(&self) -> Result<ExecutionConfig, ServerError> {
        let model = self.model.clone().ok_or(ServerError::ModelUnconfigured)?;
        Ok(ExecutionConfig {
            store: self.store.clone(),
            documents: self.documents.clone(),
            model,
            clock: self.clock.clone(),
            workspace: self.workspace.clone(),
        })
    }
}
