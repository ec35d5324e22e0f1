// crates/pipeline-gate-supervisor/tests/supervisor_exec.rs
// ============================================================================
// Module: Supervisor Execution Tests
// Description: End-to-end scenarios for the execution loop.
// ============================================================================
//! ## Overview
//! Drives full runs through the supervisor against the real SQLite store and
//! a scripted model proxy: the generic happy path, the two-gate approval
//! path, gate rejection, cap breaches, forbidden-key injection, per-worker
//! timeouts, and gate durability across a dropped supervisor.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline_gate_core::Clock;
use pipeline_gate_core::CompileRequest;
use pipeline_gate_core::DocId;
use pipeline_gate_core::DocStore;
use pipeline_gate_core::DocStoreError;
use pipeline_gate_core::DocumentRef;
use pipeline_gate_core::GateResolution;
use pipeline_gate_core::GateTransition;
use pipeline_gate_core::GovernanceLevel;
use pipeline_gate_core::ModelError;
use pipeline_gate_core::ModelProxy;
use pipeline_gate_core::ModelReply;
use pipeline_gate_core::ModelRequest;
use pipeline_gate_core::PipelineConfig;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::PlanId;
use pipeline_gate_core::RunStatus;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::TenantId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::TokenUsage;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::compile;
use pipeline_gate_core::hashing::hash_bytes;
use pipeline_gate_core::interfaces::StoredDocument;
use pipeline_gate_store_sqlite::SqliteJournalMode;
use pipeline_gate_store_sqlite::SqliteRunStore;
use pipeline_gate_store_sqlite::SqliteStoreConfig;
use pipeline_gate_supervisor::ExecutionConfig;
use pipeline_gate_supervisor::ExecutionStatus;
use pipeline_gate_supervisor::bundle::bundle_path;
use pipeline_gate_supervisor::resume_after_gate;
use pipeline_gate_supervisor::start_execution;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Scripted Capabilities
// ============================================================================

/// Per-role model behavior override.
#[derive(Clone)]
enum ModelBehavior {
    /// Reply with fixed content and token counts.
    Reply {
        /// Completion text.
        content: String,
        /// Input tokens reported.
        input: u64,
        /// Output tokens reported.
        output: u64,
    },
    /// Fail the call.
    Fail(String),
    /// Sleep before replying with the default.
    Delay(Duration),
}

/// Scripted model proxy keyed by worker role.
struct MockModel {
    /// Behavior overrides keyed by worker type label.
    overrides: Mutex<HashMap<String, ModelBehavior>>,
}

impl MockModel {
    /// Builds a proxy with default replies for every role.
    fn new() -> Self {
        Self {
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the behavior for one worker type label.
    fn set(&self, worker: &str, behavior: ModelBehavior) {
        self.overrides.lock().expect("lock").insert(worker.to_string(), behavior);
    }

    /// Returns the default reply for a worker type label.
    fn default_reply(worker: &str) -> ModelReply {
        let (content, input, output) = match worker {
            "extractor" => (r#"{"claims": [{"id": 1, "status": "filed"}]}"#, 100, 50),
            "validator" => (r#"{"score": 0.9, "flags": []}"#, 40, 20),
            "writer" => ("# Report\n\nAll evidence reviewed.", 200, 100),
            _ => ("{}", 1, 1),
        };
        ModelReply {
            content: content.to_string(),
            tokens_used: TokenUsage {
                input,
                output,
            },
        }
    }
}

#[async_trait]
impl ModelProxy for MockModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        let worker = request.metadata.role.strip_prefix("worker:").unwrap_or("").to_string();
        let behavior = self.overrides.lock().map_err(|err| ModelError::Proxy(err.to_string()))?.get(&worker).cloned();
        match behavior {
            Some(ModelBehavior::Reply {
                content,
                input,
                output,
            }) => Ok(ModelReply {
                content,
                tokens_used: TokenUsage {
                    input,
                    output,
                },
            }),
            Some(ModelBehavior::Fail(message)) => Err(ModelError::Proxy(message)),
            Some(ModelBehavior::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(Self::default_reply(&worker))
            }
            None => Ok(Self::default_reply(&worker)),
        }
    }
}

/// In-memory document store.
#[derive(Default)]
struct MockDocs {
    /// Documents keyed by identifier.
    documents: HashMap<String, StoredDocument>,
}

#[async_trait]
impl DocStore for MockDocs {
    async fn get(
        &self,
        _tenant_id: &TenantId,
        doc_id: &DocId,
    ) -> Result<Option<StoredDocument>, DocStoreError> {
        Ok(self.documents.get(doc_id.as_str()).cloned())
    }
}

/// Deterministic ticking clock (one second per call).
struct TickClock {
    /// Seconds elapsed since the fixed base instant.
    ticks: Mutex<i64>,
}

impl TickClock {
    /// Builds a clock starting at a fixed instant.
    fn new() -> Self {
        Self {
            ticks: Mutex::new(0),
        }
    }
}

impl Clock for TickClock {
    fn now(&self) -> Timestamp {
        let mut ticks = self.ticks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *ticks += 1;
        let instant = OffsetDateTime::from_unix_timestamp(1_770_000_000 + *ticks)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Timestamp::new(instant)
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// One wired execution environment over a store.
struct Harness {
    /// Concrete store handle for direct assertions.
    store: Arc<SqliteRunStore>,
    /// Scripted model proxy.
    model: Arc<MockModel>,
    /// Execution config handed to the supervisor.
    cfg: ExecutionConfig,
    /// Workspace directory guard.
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Builds a harness over an in-memory store.
    fn new() -> Self {
        Self::over(SqliteRunStore::open_in_memory().expect("store"))
    }

    /// Builds a harness over a specific store.
    fn over(store: SqliteRunStore) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(store);
        let model = Arc::new(MockModel::new());
        let mut docs = MockDocs::default();
        docs.documents.insert("doc-1".to_string(), StoredDocument {
            content: b"hello\n".to_vec(),
            filename: "hello.txt".to_string(),
            mime_type: "text/plain".to_string(),
        });
        let cfg = ExecutionConfig {
            store: store.clone(),
            documents: Arc::new(docs),
            model: model.clone(),
            clock: Arc::new(TickClock::new()),
            workspace: dir.path().to_path_buf(),
        };
        Self {
            store,
            model,
            cfg,
            _dir: dir,
        }
    }
}

/// Builds the test tenant.
fn tenant() -> TenantId {
    TenantId::parse("tenant-a").expect("tenant")
}

/// Compiles a run for `domain` and persists it as pending.
fn create_run(harness: &Harness, domain: &str, governance_level: GovernanceLevel) -> PipelineRun {
    let compiled = compile(
        &CompileRequest {
            pipeline: PipelineConfig {
                roles: Vec::new(),
                domain: domain.to_string(),
                governance_level,
                constraints: Vec::new(),
                inputs: vec!["uploaded documents".to_string()],
                outputs: vec!["summary report".to_string()],
            },
            case_id: None,
            documents: vec![DocumentRef {
                doc_id: "doc-1".into(),
                filename: "hello.txt".to_string(),
                mime_type: "text/plain".to_string(),
                content_hash: hash_bytes(b"hello\n"),
                size_bytes: 6,
            }],
        },
        PlanId::generate(),
        Timestamp::from_rfc3339("2026-03-01T00:00:00Z").expect("timestamp"),
    )
    .expect("compile");
    let run = PipelineRun::pending(
        tenant(),
        compiled.plan,
        compiled.plan_hash,
        Timestamp::from_rfc3339("2026-03-01T00:00:01Z").expect("timestamp"),
    );
    harness.store.create_run(&run).expect("create");
    run
}

/// Approves the gate a run is paused at and returns the reloaded run.
fn approve_gate(harness: &Harness, run_id: &pipeline_gate_core::RunId, gate_id: &str) -> PipelineRun {
    let transition = harness
        .store
        .resolve_gate(&tenant(), run_id, &GateResolution {
            gate_id: gate_id.into(),
            approved: true,
            resolved_at: Timestamp::from_rfc3339("2026-03-01T01:00:00Z").expect("timestamp"),
            resolved_by: "reviewer@example.test".to_string(),
            rationale: None,
        })
        .expect("resolve");
    assert_eq!(transition, GateTransition::Approved);
    harness.store.get_run(&tenant(), run_id).expect("get").expect("present")
}

// ============================================================================
// SECTION: Scenarios
// ============================================================================

#[tokio::test]
async fn generic_advisory_run_completes_and_seals() {
    let harness = Harness::new();
    let run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    let run_id = run.id.clone();
    let caps = run.spawn_plan.caps;

    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Completed, "error: {:?}", result.error);
    assert_eq!(result.worker_results.len(), 4);

    // Allowlist closure and cap monotonicity over the terminal state.
    for output in result.worker_results.values() {
        assert!(WorkerType::is_allowed(output.worker_type.as_str()));
    }
    assert!(result.caps_used.tokens <= caps.max_tokens);
    assert!(u64::from(result.caps_used.workers_spawned) <= u64::from(caps.max_workers));

    let bundle = result.evidence_bundle.expect("bundle");
    let verification = bundle.verify();
    assert!(verification.valid, "reason: {:?}", verification.reason);
    // Plan + four worker outputs + three completion artifacts.
    assert_eq!(bundle.artifacts.len(), 8);

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Sealed);
    assert_eq!(stored.evidence_bundle_id, Some(bundle.bundle_id.clone()));
    assert!(bundle_path(&harness.cfg.workspace, &run_id).exists());
}

#[tokio::test]
async fn execute_is_rejected_for_non_pending_runs() {
    let harness = Harness::new();
    let run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    let run_id = run.id.clone();

    let first = start_execution(run, &harness.cfg).await;
    assert_eq!(first.status, ExecutionStatus::Completed);

    let reloaded = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    let second = start_execution(reloaded, &harness.cfg).await;
    assert_eq!(second.status, ExecutionStatus::Failed);
    assert!(second.error.as_deref().is_some_and(|e| e.contains("not pending")));

    // The sealed run is untouched.
    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Sealed);
}

#[tokio::test]
async fn va_strict_run_pauses_at_both_gates_then_completes() {
    let harness = Harness::new();
    let run = create_run(&harness, "va-claims", GovernanceLevel::Strict);
    let run_id = run.id.clone();

    let first = start_execution(run, &harness.cfg).await;
    assert_eq!(first.status, ExecutionStatus::PausedAtGate);
    assert_eq!(first.gate_id.as_ref().map(|g| g.as_str()), Some("gate-validation-review"));
    assert_eq!(first.current_node.as_ref().map(|n| n.as_str()), Some("node-validator"));
    assert_eq!(first.worker_results.len(), 3);

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::PausedAtGate);

    let resumed = approve_gate(&harness, &run_id, "gate-validation-review");
    let second = resume_after_gate(resumed, &harness.cfg).await;
    assert_eq!(second.status, ExecutionStatus::PausedAtGate);
    assert_eq!(second.gate_id.as_ref().map(|g| g.as_str()), Some("gate-final-approval"));
    assert_eq!(second.worker_results.len(), 5);

    let resumed = approve_gate(&harness, &run_id, "gate-final-approval");
    let third = resume_after_gate(resumed, &harness.cfg).await;
    assert_eq!(third.status, ExecutionStatus::Completed, "error: {:?}", third.error);
    assert_eq!(third.worker_results.len(), 6);

    let bundle = third.evidence_bundle.expect("bundle");
    assert_eq!(bundle.gate_records.len(), 2);
    assert!(bundle.artifacts.iter().any(|a| a.filename == "gate_resolutions.json"));
    assert!(bundle.verify().valid);
}

#[tokio::test]
async fn gate_rejection_fails_without_further_spawns() {
    let harness = Harness::new();
    let run = create_run(&harness, "va-claims", GovernanceLevel::Strict);
    let run_id = run.id.clone();

    let first = start_execution(run, &harness.cfg).await;
    assert_eq!(first.status, ExecutionStatus::PausedAtGate);

    let transition = harness
        .store
        .resolve_gate(&tenant(), &run_id, &GateResolution {
            gate_id: "gate-validation-review".into(),
            approved: false,
            resolved_at: Timestamp::from_rfc3339("2026-03-01T01:00:00Z").expect("timestamp"),
            resolved_by: "reviewer@example.test".to_string(),
            rationale: Some("insufficient evidence".to_string()),
        })
        .expect("resolve");
    assert_eq!(transition, GateTransition::Rejected);

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored.error.as_deref().is_some_and(|e| e.contains("insufficient evidence")));
    // No worker ran past the gate.
    assert_eq!(stored.worker_results.len(), 3);
    assert!(stored.evidence_bundle_id.is_none());
}

#[tokio::test]
async fn token_cap_breach_fails_at_next_precheck() {
    let harness = Harness::new();
    let mut run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    run.spawn_plan.caps.max_tokens = 100;
    harness.model.set("extractor", ModelBehavior::Reply {
        content: r#"{"claims": []}"#.to_string(),
        input: 150,
        output: 50,
    });

    let run_id = run.id.clone();
    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("max_tokens")));
    // The offending output is retained for inspection.
    assert!(result.worker_results.keys().any(|node| node.as_str() == "node-extractor"));

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(stored.evidence_bundle_id.is_none());
    assert!(!bundle_path(&harness.cfg.workspace, &run_id).exists());
}

#[tokio::test]
async fn forbidden_key_injection_fails_the_run() {
    let harness = Harness::new();
    let run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    let run_id = run.id.clone();
    harness.model.set("extractor", ModelBehavior::Reply {
        content: r#"{"report": "fine", "nodes": [{"id": "x"}]}"#.to_string(),
        input: 10,
        output: 10,
    });

    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("forbidden key")));
    assert!(result.error.as_deref().is_some_and(|e| e.contains("nodes")));
    // The poisoned output is never recorded and nothing later spawns.
    assert!(!result.worker_results.keys().any(|node| node.as_str() == "node-extractor"));
    assert_eq!(result.worker_results.len(), 1);

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Failed);
    assert!(!bundle_path(&harness.cfg.workspace, &run_id).exists());
}

#[tokio::test]
async fn model_failure_surfaces_as_worker_error() {
    let harness = Harness::new();
    let run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    harness.model.set("writer", ModelBehavior::Fail("vendor unavailable".to_string()));

    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("node-writer")));
    assert!(result.error.as_deref().is_some_and(|e| e.contains("vendor unavailable")));
}

#[tokio::test]
async fn per_worker_timeout_fails_the_run() {
    let harness = Harness::new();
    let mut run = create_run(&harness, "cyber-ir", GovernanceLevel::Advisory);
    if let Some(node) = run.spawn_plan.nodes.iter_mut().find(|n| n.worker_type == WorkerType::Extractor) {
        node.per_worker_caps.max_runtime_ms = 25;
    }
    harness.model.set("extractor", ModelBehavior::Delay(Duration::from_millis(250)));

    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("timed out")));
}

#[tokio::test]
async fn strict_per_worker_token_overshoot_fails() {
    let harness = Harness::new();
    let run = create_run(&harness, "va-claims", GovernanceLevel::Strict);
    harness.model.set("extractor", ModelBehavior::Reply {
        content: r#"{"claims": []}"#.to_string(),
        input: 30_000,
        output: 3_000,
    });

    let result = start_execution(run, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("per_worker_max_tokens")));
}

#[tokio::test]
async fn gate_pause_survives_supervisor_loss() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store_config = SqliteStoreConfig {
        path: dir.path().join("runs.db"),
        busy_timeout_ms: 5_000,
        journal_mode: SqliteJournalMode::Wal,
    };

    let run_id;
    {
        let harness = Harness::over(SqliteRunStore::open(&store_config).expect("store"));
        let run = create_run(&harness, "va-claims", GovernanceLevel::Strict);
        run_id = run.id.clone();
        let paused = start_execution(run, &harness.cfg).await;
        assert_eq!(paused.status, ExecutionStatus::PausedAtGate);
        // Harness (supervisor state, workspace, model) dropped here.
    }

    // A fresh process: new store handle, new config, no in-memory state.
    let harness = Harness::over(SqliteRunStore::open(&store_config).expect("store"));
    let resumed = approve_gate(&harness, &run_id, "gate-validation-review");
    assert_eq!(resumed.status, RunStatus::Running);
    assert_eq!(resumed.worker_results.len(), 3);

    let second = resume_after_gate(resumed, &harness.cfg).await;
    assert_eq!(second.status, ExecutionStatus::PausedAtGate);
    let resumed = approve_gate(&harness, &run_id, "gate-final-approval");
    let third = resume_after_gate(resumed, &harness.cfg).await;
    assert_eq!(third.status, ExecutionStatus::Completed, "error: {:?}", third.error);

    let bundle = third.evidence_bundle.expect("bundle");
    assert!(bundle.verify().valid);
    assert_eq!(bundle.gate_records.len(), 2);

    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::Sealed);
}

#[tokio::test]
async fn resume_refuses_paused_runs() {
    let harness = Harness::new();
    let run = create_run(&harness, "va-claims", GovernanceLevel::Strict);
    let run_id = run.id.clone();
    let paused = start_execution(run, &harness.cfg).await;
    assert_eq!(paused.status, ExecutionStatus::PausedAtGate);

    // Resuming without a gate resolution must refuse.
    let still_paused = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    let result = resume_after_gate(still_paused, &harness.cfg).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("not running")));

    // The stored run is still paused and resumable.
    let stored = harness.store.get_run(&tenant(), &run_id).expect("get").expect("present");
    assert_eq!(stored.status, RunStatus::PausedAtGate);
}
