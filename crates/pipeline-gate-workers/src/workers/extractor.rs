// crates/pipeline-gate-workers/src/workers/extractor.rs
// ============================================================================
// Module: Extractor Worker
// Description: Extracts structured facts from document contents.
// Purpose: Turn uploaded documents into a structured evidence working set.
// Dependencies: pipeline-gate-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The extractor reads document bytes through the scoped context, excerpts
//! them as UTF-8 text, and asks the model for structured facts. A reply that
//! parses as a JSON object is used as-is; anything else is wrapped under a
//! `facts` key so downstream workers always see an object.

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
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Evidence artifact filename.
const EVIDENCE_FILENAME: &str = "extracted_evidence.json";

/// Maximum characters excerpted per document.
const MAX_EXCERPT_CHARS: usize = 4_000;

// ============================================================================
// SECTION: Extractor Worker
// ============================================================================

/// Model-backed worker that extracts structured facts from documents.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorWorker;

#[async_trait]
impl WorkerModule for ExtractorWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Extractor
    }

    async fn execute(
        &self,
        instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let mut excerpts = Vec::with_capacity(input.document_refs.len());
        let mut read_doc_ids = Vec::with_capacity(input.document_refs.len());
        for doc_ref in &input.document_refs {
            match ctx.read_document(&doc_ref.doc_id).await? {
                Some(document) => {
                    let text: String = String::from_utf8_lossy(&document.content)
                        .chars()
                        .take(MAX_EXCERPT_CHARS)
                        .collect();
                    excerpts.push(format!("--- {} ---\n{text}", document.filename));
                    read_doc_ids.push(doc_ref.doc_id.clone());
                }
                None => {
                    debug!(doc_id = %doc_ref.doc_id, "document missing at extraction time");
                }
            }
        }

        let user_message = format!(
            "{}\n\nConstraints: {}\n\nDocuments:\n{}",
            instruction.task_description,
            instruction.constraints.join("; "),
            excerpts.join("\n\n"),
        );
        let reply = ctx.model(&instruction.system_prompt, &user_message).await?;

        let facts = match serde_json::from_str::<Value>(&reply.content) {
            Ok(parsed @ Value::Object(_)) => parsed,
            _ => json!({ "facts": reply.content }),
        };
        let data = json!({
            "extraction": facts,
            "documents": read_doc_ids,
        });

        let artifact = serde_json::to_vec(&data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let artifact_path = ctx.write_artifact(EVIDENCE_FILENAME, &artifact).await?;

        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data,
            summary: format!("Extracted facts from {} document(s)", read_doc_ids.len()),
            tokens_used: reply.tokens_used.total(),
            artifact_paths: vec![artifact_path],
        })
    }
}
