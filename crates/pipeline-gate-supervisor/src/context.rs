// crates/pipeline-gate-supervisor/src/context.rs
// ============================================================================
// Module: Scoped Worker Context
// Description: Per-spawn capability scope for one worker execution.
// Purpose: Bind model calls to audit metadata and confine filesystem writes.
// Dependencies: pipeline-gate-core, tokio
// ============================================================================

//! ## Overview
//! Every spawn receives a fresh context scoped to one node of one run. Model
//! calls carry `worker:<type>` audit metadata; artifact writes are confined
//! to the run's artifact directory and rejected for traversal-shaped names;
//! document reads stay within the run's tenant. The context holds no
//! reference to the supervisor or the registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline_gate_core::DocId;
use pipeline_gate_core::DocStore;
use pipeline_gate_core::ModelCallMetadata;
use pipeline_gate_core::ModelProxy;
use pipeline_gate_core::ModelReply;
use pipeline_gate_core::ModelRequest;
use pipeline_gate_core::TenantId;
use pipeline_gate_core::interfaces::PolicyView;
use pipeline_gate_core::interfaces::StoredDocument;
use pipeline_gate_core::interfaces::WorkerContext;
use pipeline_gate_core::interfaces::WorkerInvokeError;
use pipeline_gate_core::validate_artifact_name;

// ============================================================================
// SECTION: Scoped Context
// ============================================================================

/// Capability scope for one worker spawn.
///
/// # Invariants
/// - `artifacts_dir` is always `<workspace>/run/<run_id>/artifacts`.
/// - Artifact names are validated before any filesystem contact.
pub(crate) struct ScopedWorkerContext {
    /// Model proxy shared by the run.
    model: Arc<dyn ModelProxy>,
    /// Document store shared by the run.
    documents: Arc<dyn DocStore>,
    /// Tenant owning the run.
    tenant_id: TenantId,
    /// Audit metadata bound to every model call from this scope.
    metadata: ModelCallMetadata,
    /// Absolute artifact directory for the run.
    artifacts_dir: PathBuf,
    /// Workspace-relative artifact directory prefix.
    relative_prefix: String,
    /// Read-only policy view.
    policy: PolicyView,
}

impl ScopedWorkerContext {
    /// Builds a context scoped to one node of one run.
    pub(crate) fn new(
        model: Arc<dyn ModelProxy>,
        documents: Arc<dyn DocStore>,
        tenant_id: TenantId,
        metadata: ModelCallMetadata,
        workspace: &std::path::Path,
        run_id: &str,
        policy: PolicyView,
    ) -> Self {
        let artifacts_dir = workspace.join("run").join(run_id).join("artifacts");
        Self {
            model,
            documents,
            tenant_id,
            metadata,
            artifacts_dir,
            relative_prefix: format!("run/{run_id}/artifacts"),
            policy,
        }
    }
}

#[async_trait]
impl WorkerContext for ScopedWorkerContext {
    async fn model(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<ModelReply, WorkerInvokeError> {
        let reply = self
            .model
            .complete(ModelRequest {
                system_prompt: system_prompt.to_string(),
                user_message: user_message.to_string(),
                metadata: self.metadata.clone(),
            })
            .await?;
        Ok(reply)
    }

    async fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<String, WorkerInvokeError> {
        validate_artifact_name(name)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let target = self.artifacts_dir.join(name);
        let parent = target.parent().unwrap_or(self.artifacts_dir.as_path());
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        Ok(format!("{}/{name}", self.relative_prefix))
    }

    async fn read_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<StoredDocument>, WorkerInvokeError> {
        Ok(self.documents.get(&self.tenant_id, doc_id).await?)
    }

    fn policy(&self) -> &PolicyView {
        &self.policy
    }
}
