// crates/pipeline-gate-workers/src/workers/writer.rs
// ============================================================================
// Module: Writer Worker
// Description: Synthesizes a markdown report from all prior outputs.
// Purpose: Produce the human-facing deliverable of a run.
// Dependencies: pipeline-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The writer assembles every upstream output it received into a single
//! model prompt and emits the reply as the run's markdown report, alongside
//! a metadata artifact describing the synthesis. The report text also lands
//! in the output data so the evidence chain covers it.

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

/// Markdown report artifact filename.
const REPORT_FILENAME: &str = "ecv_report.md";

/// Report metadata artifact filename.
const METADATA_FILENAME: &str = "report_metadata.json";

// ============================================================================
// SECTION: Writer Worker
// ============================================================================

/// Model-backed worker that synthesizes the run report.
#[derive(Debug, Clone, Copy)]
pub struct WriterWorker;

#[async_trait]
impl WorkerModule for WriterWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Writer
    }

    async fn execute(
        &self,
        instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let mut sections = Vec::with_capacity(input.data.len());
        for (data_key, value) in &input.data {
            sections.push(format!(
                "## {data_key}\n{}",
                serde_json::to_string_pretty(value)
                    .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?,
            ));
        }
        let user_message = format!(
            "{}\n\nConstraints: {}\n\nSource material:\n{}",
            instruction.task_description,
            instruction.constraints.join("; "),
            sections.join("\n\n"),
        );
        let reply = ctx.model(&instruction.system_prompt, &user_message).await?;

        let word_count = reply.content.split_whitespace().count();
        let report_path = ctx.write_artifact(REPORT_FILENAME, reply.content.as_bytes()).await?;

        let metadata = json!({
            "word_count": word_count,
            "source_keys": input.data.keys().collect::<Vec<_>>(),
            "format": instruction.output_format,
        });
        let metadata_bytes = serde_json::to_vec(&metadata)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let metadata_path = ctx.write_artifact(METADATA_FILENAME, &metadata_bytes).await?;

        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data: json!({
                "report_markdown": reply.content,
                "metadata": metadata,
            }),
            summary: format!("Synthesized report ({word_count} words)"),
            tokens_used: reply.tokens_used.total(),
            artifact_paths: vec![report_path, metadata_path],
        })
    }
}
