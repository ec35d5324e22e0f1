// crates/pipeline-gate-workers/src/workers/validator.rs
// ============================================================================
// Module: Validator Worker
// Description: Cross-checks extractor output for internal consistency.
// Purpose: Score the evidence working set before it reaches governance.
// Dependencies: pipeline-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The validator asks the model to cross-check the extracted facts and emits
//! a validation report with an overall score and a flag list. A reply that
//! parses as a JSON object contributes `score` and `flags` directly;
//! otherwise the reply text becomes a single advisory flag with a neutral
//! score, keeping the report shape stable for downstream workers.

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
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Validation report artifact filename.
const REPORT_FILENAME: &str = "validation_report.json";

/// Score assigned when the model reply is not structured.
const NEUTRAL_SCORE: f64 = 0.5;

// ============================================================================
// SECTION: Validator Worker
// ============================================================================

/// Model-backed worker that scores evidence consistency.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorWorker;

#[async_trait]
impl WorkerModule for ValidatorWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Validator
    }

    async fn execute(
        &self,
        instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let evidence = input.data.get("evidence").cloned().unwrap_or(Value::Null);
        let user_message = format!(
            "{}\n\nEvidence under review:\n{}",
            instruction.task_description,
            serde_json::to_string_pretty(&evidence)
                .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?,
        );
        let reply = ctx.model(&instruction.system_prompt, &user_message).await?;

        let (score, flags) = match serde_json::from_str::<Value>(&reply.content) {
            Ok(Value::Object(report)) => {
                let score = report.get("score").and_then(Value::as_f64).unwrap_or(NEUTRAL_SCORE);
                let flags = report.get("flags").cloned().unwrap_or_else(|| json!([]));
                (score, flags)
            }
            _ => (NEUTRAL_SCORE, json!([{ "kind": "advisory", "note": reply.content }])),
        };

        let data = json!({
            "score": score,
            "flags": flags,
            "consistent": score >= NEUTRAL_SCORE,
        });

        let artifact = serde_json::to_vec(&data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let artifact_path = ctx.write_artifact(REPORT_FILENAME, &artifact).await?;

        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data,
            summary: format!("Validation score {score:.2}"),
            tokens_used: reply.tokens_used.total(),
            artifact_paths: vec![artifact_path],
        })
    }
}
