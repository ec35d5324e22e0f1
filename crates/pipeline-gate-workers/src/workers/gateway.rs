// crates/pipeline-gate-workers/src/workers/gateway.rs
// ============================================================================
// Module: Gateway Worker
// Description: Validates uploaded documents and declares run readiness.
// Purpose: Gate the pipeline on document inventory before any model spend.
// Dependencies: pipeline-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The gateway worker is computational: it inventories the run's document
//! references, decides a readiness verdict, and snapshots the result as the
//! run's first artifact. A run with no documents is not failed here; the
//! verdict lets downstream governance decide.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use pipeline_gate_core::WorkerDraft;
use pipeline_gate_core::WorkerInstruction;
use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerStatus;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::interfaces::WorkerContext;
use pipeline_gate_core::interfaces::WorkerInput;
use pipeline_gate_core::interfaces::WorkerInvokeError;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot artifact filename.
const SNAPSHOT_FILENAME: &str = "run_snapshot.json";

/// Readiness verdict: documents are present and well-formed.
pub const VERDICT_OK: &str = "OK_TO_PROCEED";
/// Readiness verdict: no documents were provided.
pub const VERDICT_NEED_DOCS: &str = "NEED_DOCS";
/// Readiness verdict: documents need a human look before processing.
pub const VERDICT_NEED_HUMAN_REVIEW: &str = "NEED_HUMAN_REVIEW";

// ============================================================================
// SECTION: Gateway Worker
// ============================================================================

/// Computational worker that inventories documents and declares readiness.
#[derive(Debug, Clone, Copy)]
pub struct GatewayWorker;

#[async_trait]
impl WorkerModule for GatewayWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Gateway
    }

    async fn execute(
        &self,
        _instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let inventory: Vec<serde_json::Value> = input
            .document_refs
            .iter()
            .map(|doc| {
                json!({
                    "doc_id": doc.doc_id,
                    "filename": doc.filename,
                    "mime_type": doc.mime_type,
                    "size_bytes": doc.size_bytes,
                    "content_hash": doc.content_hash,
                })
            })
            .collect();

        let verdict = if input.document_refs.is_empty() {
            VERDICT_NEED_DOCS
        } else if input.document_refs.iter().any(|doc| doc.size_bytes == 0) {
            VERDICT_NEED_HUMAN_REVIEW
        } else {
            VERDICT_OK
        };

        let data = json!({
            "inventory": inventory,
            "verdict": verdict,
            "document_count": input.document_refs.len(),
            "pii_policy": ctx.policy().pii_policy,
        });

        let snapshot = serde_json::to_vec(&data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let artifact_path = ctx.write_artifact(SNAPSHOT_FILENAME, &snapshot).await?;

        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data,
            summary: format!(
                "Inventoried {} document(s); verdict {verdict}",
                input.document_refs.len()
            ),
            tokens_used: 0,
            artifact_paths: vec![artifact_path],
        })
    }
}
