// crates/pipeline-gate-workers/tests/worker_unit.rs
// ============================================================================
// Module: Built-in Worker Unit Tests
// Description: Exercises each worker module against a scripted context.
// ============================================================================
//! ## Overview
//! Drives every built-in worker through a mock context with scripted model
//! replies, in-memory artifacts, and canned documents, and checks the output
//! shapes the supervisor and downstream workers rely on.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline_gate_core::DocId;
use pipeline_gate_core::DocumentRef;
use pipeline_gate_core::GovernanceLevel;
use pipeline_gate_core::PiiPolicy;
use pipeline_gate_core::WorkerInstruction;
use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerStatus;
use pipeline_gate_core::hashing::hash_bytes;
use pipeline_gate_core::hashing::hash_canonical_json;
use pipeline_gate_core::interfaces::ModelReply;
use pipeline_gate_core::interfaces::PolicyView;
use pipeline_gate_core::interfaces::StoredDocument;
use pipeline_gate_core::interfaces::TokenUsage;
use pipeline_gate_core::interfaces::WorkerContext;
use pipeline_gate_core::interfaces::WorkerInput;
use pipeline_gate_core::interfaces::WorkerInvokeError;
use pipeline_gate_workers::ComplianceWorker;
use pipeline_gate_workers::ExtractorWorker;
use pipeline_gate_workers::GatewayWorker;
use pipeline_gate_workers::TelemetryWorker;
use pipeline_gate_workers::ValidatorWorker;
use pipeline_gate_workers::WriterWorker;
use serde_json::json;

// ============================================================================
// SECTION: Mock Context
// ============================================================================

/// Scripted worker context with in-memory artifacts and documents.
struct MockContext {
    /// Policy view handed to workers.
    policy: PolicyView,
    /// Scripted model replies consumed in order.
    replies: Mutex<VecDeque<ModelReply>>,
    /// Captured artifact writes keyed by name.
    artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Canned documents keyed by identifier.
    documents: BTreeMap<String, StoredDocument>,
}

impl MockContext {
    /// Builds a context with the default advisory policy.
    fn new() -> Self {
        Self {
            policy: PolicyView {
                pii_policy: PiiPolicy::PiiAllowed,
                governance_level: GovernanceLevel::Advisory,
                constraints: Vec::new(),
            },
            replies: Mutex::new(VecDeque::new()),
            artifacts: Mutex::new(BTreeMap::new()),
            documents: BTreeMap::new(),
        }
    }

    /// Queues a scripted model reply.
    fn script_reply(&self, content: &str, input: u64, output: u64) {
        self.replies.lock().expect("lock").push_back(ModelReply {
            content: content.to_string(),
            tokens_used: TokenUsage {
                input,
                output,
            },
        });
    }

    /// Returns a captured artifact's bytes.
    fn artifact(&self, name: &str) -> Option<Vec<u8>> {
        self.artifacts.lock().expect("lock").get(name).cloned()
    }
}

#[async_trait]
impl WorkerContext for MockContext {
    async fn model(
        &self,
        _system_prompt: &str,
        _user_message: &str,
    ) -> Result<ModelReply, WorkerInvokeError> {
        self.replies
            .lock()
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?
            .pop_front()
            .ok_or_else(|| {
                WorkerInvokeError::Model(pipeline_gate_core::ModelError::Proxy(
                    "no scripted reply".to_string(),
                ))
            })
    }

    async fn write_artifact(
        &self,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, WorkerInvokeError> {
        self.artifacts
            .lock()
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?
            .insert(name.to_string(), bytes.to_vec());
        Ok(format!("run/test/artifacts/{name}"))
    }

    async fn read_document(
        &self,
        doc_id: &DocId,
    ) -> Result<Option<StoredDocument>, WorkerInvokeError> {
        Ok(self.documents.get(doc_id.as_str()).cloned())
    }

    fn policy(&self) -> &PolicyView {
        &self.policy
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a plain worker instruction.
fn instruction() -> WorkerInstruction {
    WorkerInstruction {
        system_prompt: "You are a pipeline worker.".to_string(),
        task_description: "Process the inputs.".to_string(),
        constraints: vec!["cite-sources".to_string()],
        output_format: Some("json".to_string()),
    }
}

/// Builds a document reference for `content`.
fn doc_ref(doc_id: &str, filename: &str, content: &[u8]) -> DocumentRef {
    DocumentRef {
        doc_id: doc_id.into(),
        filename: filename.to_string(),
        mime_type: "text/plain".to_string(),
        content_hash: hash_bytes(content),
        size_bytes: u64::try_from(content.len()).expect("size"),
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

#[tokio::test]
async fn gateway_reports_ok_with_documents() {
    let ctx = MockContext::new();
    let input = WorkerInput {
        data: BTreeMap::new(),
        document_refs: vec![doc_ref("doc-1", "evidence.txt", b"hello\n")],
    };
    let draft = GatewayWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.status, WorkerStatus::Success);
    assert_eq!(draft.data["verdict"], json!("OK_TO_PROCEED"));
    assert_eq!(draft.data["document_count"], json!(1));
    assert_eq!(draft.tokens_used, 0);
    assert!(ctx.artifact("run_snapshot.json").is_some());
}

#[tokio::test]
async fn gateway_requires_documents() {
    let ctx = MockContext::new();
    let input = WorkerInput::default();
    let draft = GatewayWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert_eq!(draft.data["verdict"], json!("NEED_DOCS"));
}

#[tokio::test]
async fn gateway_flags_empty_documents_for_review() {
    let ctx = MockContext::new();
    let input = WorkerInput {
        data: BTreeMap::new(),
        document_refs: vec![doc_ref("doc-1", "empty.txt", b"")],
    };
    let draft = GatewayWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert_eq!(draft.data["verdict"], json!("NEED_HUMAN_REVIEW"));
}

// ============================================================================
// SECTION: Extractor
// ============================================================================

#[tokio::test]
async fn extractor_uses_structured_reply_and_counts_tokens() {
    let mut ctx = MockContext::new();
    ctx.documents.insert("doc-1".to_string(), StoredDocument {
        content: b"claim filed 2026".to_vec(),
        filename: "claim.txt".to_string(),
        mime_type: "text/plain".to_string(),
    });
    ctx.script_reply(r#"{"claims": [{"id": 1, "status": "filed"}]}"#, 120, 80);

    let input = WorkerInput {
        data: BTreeMap::new(),
        document_refs: vec![doc_ref("doc-1", "claim.txt", b"claim filed 2026")],
    };
    let draft = ExtractorWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.data["extraction"]["claims"][0]["status"], json!("filed"));
    assert_eq!(draft.data["documents"], json!(["doc-1"]));
    assert_eq!(draft.tokens_used, 200);
    assert!(ctx.artifact("extracted_evidence.json").is_some());
}

#[tokio::test]
async fn extractor_wraps_unstructured_reply() {
    let ctx = MockContext::new();
    ctx.script_reply("plain prose summary", 10, 5);
    let input = WorkerInput::default();
    let draft = ExtractorWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert_eq!(draft.data["extraction"]["facts"], json!("plain prose summary"));
}

// ============================================================================
// SECTION: Validator
// ============================================================================

#[tokio::test]
async fn validator_reads_structured_score() {
    let ctx = MockContext::new();
    ctx.script_reply(r#"{"score": 0.92, "flags": [{"kind": "date-gap"}]}"#, 50, 20);
    let mut data = BTreeMap::new();
    data.insert("evidence".to_string(), json!({"claims": []}));
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = ValidatorWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.data["score"], json!(0.92));
    assert_eq!(draft.data["consistent"], json!(true));
    assert!(ctx.artifact("validation_report.json").is_some());
}

#[tokio::test]
async fn validator_defaults_to_neutral_score() {
    let ctx = MockContext::new();
    ctx.script_reply("inconclusive", 5, 5);
    let input = WorkerInput::default();
    let draft = ValidatorWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert_eq!(draft.data["score"], json!(0.5));
}

// ============================================================================
// SECTION: Compliance
// ============================================================================

#[tokio::test]
async fn compliance_requires_redaction_under_no_raw_pii() {
    let mut ctx = MockContext::new();
    ctx.policy.pii_policy = PiiPolicy::NoRawPii;
    let mut data = BTreeMap::new();
    data.insert(
        "evidence".to_string(),
        json!({"note": "SSN 123-45-6789 and mail veteran@example.org"}),
    );
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = ComplianceWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.data["pii_policy_action"], json!("REDACTION_REQUIRED"));
    let findings = draft.data["pii_findings"].as_array().expect("findings");
    assert_eq!(findings.len(), 2);
    assert!(ctx.artifact("compliance_report.json").is_some());
}

#[tokio::test]
async fn compliance_skips_action_when_pii_allowed() {
    let ctx = MockContext::new();
    let mut data = BTreeMap::new();
    data.insert("evidence".to_string(), json!({"note": "SSN 123-45-6789"}));
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = ComplianceWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert!(draft.data.get("pii_policy_action").is_none());
}

#[tokio::test]
async fn compliance_reports_clean_input() {
    let ctx = MockContext::new();
    let mut data = BTreeMap::new();
    data.insert("evidence".to_string(), json!({"note": "no personal data here"}));
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = ComplianceWorker.execute(&instruction(), &input, &ctx).await.expect("execute");
    assert_eq!(draft.data["pii_findings"], json!([]));
}

// ============================================================================
// SECTION: Writer
// ============================================================================

#[tokio::test]
async fn writer_emits_report_and_metadata() {
    let ctx = MockContext::new();
    ctx.script_reply("# Findings\n\nAll evidence is consistent.", 300, 150);
    let mut data = BTreeMap::new();
    data.insert("evidence".to_string(), json!({"claims": []}));
    data.insert("compliance".to_string(), json!({"eligible": true}));
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = WriterWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.tokens_used, 450);
    assert_eq!(draft.artifact_paths.len(), 2);
    let report = ctx.artifact("ecv_report.md").expect("report");
    assert!(String::from_utf8(report).expect("utf8").starts_with("# Findings"));
    assert!(ctx.artifact("report_metadata.json").is_some());
    assert_eq!(draft.data["metadata"]["word_count"], json!(6));
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

#[tokio::test]
async fn telemetry_hashes_every_upstream_output() {
    let ctx = MockContext::new();
    let gateway_data = json!({"verdict": "OK_TO_PROCEED"});
    let writer_data = json!({"report_markdown": "# Findings"});
    let mut data = BTreeMap::new();
    data.insert("node-gateway".to_string(), gateway_data.clone());
    data.insert("node-writer".to_string(), writer_data.clone());
    let input = WorkerInput {
        data,
        document_refs: Vec::new(),
    };
    let draft = TelemetryWorker.execute(&instruction(), &input, &ctx).await.expect("execute");

    assert_eq!(draft.tokens_used, 0);
    assert_eq!(draft.data["node_count"], json!(2));
    let manifest = draft.data["manifest"].as_array().expect("manifest");
    let expected = hash_canonical_json(&gateway_data).expect("hash");
    assert!(manifest.iter().any(|entry| {
        entry["node"] == json!("node-gateway")
            && entry["content_hash"] == json!(expected.as_str())
    }));
    assert!(ctx.artifact("evidence_manifest.json").is_some());
}
