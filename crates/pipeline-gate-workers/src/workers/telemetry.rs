// crates/pipeline-gate-workers/src/workers/telemetry.rs
// ============================================================================
// Module: Telemetry Worker
// Description: Hashes all upstream outputs and emits the run manifest.
// Purpose: Close every run with a computational integrity record.
// Dependencies: pipeline-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The telemetry worker is computational and makes no model call. It
//! receives the full map of prior results, hashes each node's output data
//! with the canonical encoding, and writes the inner evidence manifest that
//! the bundle seal later chains over.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use pipeline_gate_core::WorkerDraft;
use pipeline_gate_core::WorkerInstruction;
use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerStatus;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::hashing::hash_canonical_json;
use pipeline_gate_core::interfaces::WorkerContext;
use pipeline_gate_core::interfaces::WorkerInput;
use pipeline_gate_core::interfaces::WorkerInvokeError;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Manifest artifact filename.
const MANIFEST_FILENAME: &str = "evidence_manifest.json";

// ============================================================================
// SECTION: Telemetry Worker
// ============================================================================

/// Computational worker that hashes upstream outputs into a manifest.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryWorker;

#[async_trait]
impl WorkerModule for TelemetryWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Telemetry
    }

    async fn execute(
        &self,
        _instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let mut manifest = Vec::with_capacity(input.data.len());
        for (node_label, value) in &input.data {
            let digest = hash_canonical_json(value)
                .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
            manifest.push(json!({ "node": node_label, "content_hash": digest }));
        }

        let data = json!({
            "manifest": manifest,
            "node_count": input.data.len(),
        });

        let artifact = serde_json::to_vec(&data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let artifact_path = ctx.write_artifact(MANIFEST_FILENAME, &artifact).await?;

        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data,
            summary: format!("Hashed {} upstream output(s)", input.data.len()),
            tokens_used: 0,
            artifact_paths: vec![artifact_path],
        })
    }
}
