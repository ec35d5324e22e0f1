// crates/pipeline-gate-supervisor/src/execution.rs
// ============================================================================
// Module: Supervisor Execution Loop
// Description: Sequential node execution with caps, gates, and sealing.
// Purpose: Drive a run through its plan while the store stays authoritative.
// Dependencies: pipeline-gate-core, pipeline-gate-workers, tokio, tracing
// ============================================================================

//! ## Overview
//! Execution walks the plan's ordered nodes one at a time. Before every
//! spawn the cumulative caps are prechecked; after every spawn the output is
//! schema-validated, scanned for spawn-directive keys, persisted, and added
//! to the evidence bundle. A gate with `requires_approval` commits a durable
//! pause and returns; `resume_after_gate` continues at the next node from
//! the persisted record alone. Completion seals the bundle and finishes the
//! run.
//!
//! Worker-reported errors fail the run before any gate attached to the same
//! node is considered, so an errored output can never be waved through by an
//! approval.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use pipeline_gate_core::CapDimension;
use pipeline_gate_core::CapsUsed;
use pipeline_gate_core::Clock;
use pipeline_gate_core::DocStore;
use pipeline_gate_core::EvidenceBundle;
use pipeline_gate_core::GateId;
use pipeline_gate_core::GateRecord;
use pipeline_gate_core::GateState;
use pipeline_gate_core::GovernanceLevel;
use pipeline_gate_core::ModelCallMetadata;
use pipeline_gate_core::ModelProxy;
use pipeline_gate_core::NodeId;
use pipeline_gate_core::PipelineError;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunStatus;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::SpawnNode;
use pipeline_gate_core::WorkerDraft;
use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerOutput;
use pipeline_gate_core::WorkerStatus;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::interfaces::PolicyView;
use pipeline_gate_core::interfaces::WorkerInput;
use pipeline_gate_core::validate_plan;
use pipeline_gate_core::validate_worker_output;
use pipeline_gate_workers::WorkerRegistry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::bundle;
use crate::context::ScopedWorkerContext;

// ============================================================================
// SECTION: Execution Config
// ============================================================================

/// Capabilities and settings for one execution call.
///
/// # Invariants
/// - `workspace` is the root under which all run directories live.
#[derive(Clone)]
pub struct ExecutionConfig {
    /// Durable run state authority.
    pub store: Arc<dyn RunStore>,
    /// Document binary store.
    pub documents: Arc<dyn DocStore>,
    /// Vendor-opaque model capability.
    pub model: Arc<dyn ModelProxy>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Workspace root directory.
    pub workspace: PathBuf,
}

// ============================================================================
// SECTION: Execution Result
// ============================================================================

/// Terminal disposition of one execution call.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Plan finished; evidence bundle sealed.
    Completed,
    /// Execution is durably paused at an approval gate.
    PausedAtGate,
    /// Run failed terminally.
    Failed,
}

/// Outcome returned by `start_execution` and `resume_after_gate`.
///
/// # Invariants
/// - `gate_id` is present exactly when the status is `paused_at_gate`.
/// - `evidence_bundle` is present exactly when the status is `completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Run the call executed.
    pub run_id: RunId,
    /// Terminal disposition of the call.
    pub status: ExecutionStatus,
    /// Node most recently executed.
    pub current_node: Option<NodeId>,
    /// Gate the run paused at, when paused.
    pub gate_id: Option<GateId>,
    /// Terminal error description, when failed.
    pub error: Option<String>,
    /// Sealed evidence bundle, when completed.
    pub evidence_bundle: Option<EvidenceBundle>,
    /// Cumulative resource consumption.
    pub caps_used: CapsUsed,
    /// Validated outputs keyed by node identifier.
    pub worker_results: BTreeMap<NodeId, WorkerOutput>,
}

impl ExecutionResult {
    /// Builds a failed result mirroring the run's recorded state.
    fn failed(run: &PipelineRun, error: String) -> Self {
        Self {
            run_id: run.id.clone(),
            status: ExecutionStatus::Failed,
            current_node: run.current_node.clone(),
            gate_id: None,
            error: Some(error),
            evidence_bundle: None,
            caps_used: run.caps_used,
            worker_results: run.worker_results.clone(),
        }
    }
}

// ============================================================================
// SECTION: Public Surface
// ============================================================================

/// Starts execution of a pending run.
///
/// Preflights the plan, transitions the run to `running`, and walks the plan
/// from the first node. Returns the terminal disposition of this call; a
/// paused run is resumed later with [`resume_after_gate`].
pub async fn start_execution(run: PipelineRun, cfg: &ExecutionConfig) -> ExecutionResult {
    let mut run = run;

    if let Err(violation) = validate_plan(&run.spawn_plan) {
        return fail(&mut run, cfg, &violation).await;
    }

    let started_at = cfg.clock.now();
    match cfg.store.start_run(&run.tenant_id, &run.id, started_at) {
        Ok(true) => {}
        Ok(false) => {
            return ExecutionResult::failed(&run, format!("run {} is not pending", run.id));
        }
        Err(err) => return ExecutionResult::failed(&run, err.to_string()),
    }
    run.status = RunStatus::Running;
    run.started_at = Some(started_at);

    let bundle = match bundle::new_bundle(&run, started_at) {
        Ok(bundle) => bundle,
        Err(err) => {
            return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                path: ".spawn_plan".to_string(),
                reason: err.to_string(),
            })
            .await;
        }
    };

    info!(run_id = %run.id, nodes = run.spawn_plan.nodes.len(), "execution started");
    execute_from(run, 0, bundle, cfg).await
}

/// Resumes execution after an approved gate.
///
/// Refuses unless the gate resolution already transitioned the run back to
/// `running`; the loop restarts at the node after the gate's node, with the
/// evidence bundle rebuilt from the persisted record.
pub async fn resume_after_gate(run: PipelineRun, cfg: &ExecutionConfig) -> ExecutionResult {
    let mut run = run;

    if run.status != RunStatus::Running {
        return ExecutionResult::failed(
            &run,
            format!("run {} is not running (status {})", run.id, run.status.as_str()),
        );
    }
    let Some(current_node) = run.current_node.clone() else {
        return ExecutionResult::failed(&run, format!("run {} has no resume position", run.id));
    };
    let Some(current_index) = run.spawn_plan.node_index(&current_node) else {
        return fail(&mut run, cfg, &PipelineError::NotFound {
            what: format!("resume node {current_node}"),
        })
        .await;
    };

    let bundle = match bundle::rebuild_bundle(&run) {
        Ok(bundle) => bundle,
        Err(err) => {
            return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                path: ".worker_results".to_string(),
                reason: err.to_string(),
            })
            .await;
        }
    };

    info!(run_id = %run.id, resume_after = %current_node, "execution resumed");
    execute_from(run, current_index + 1, bundle, cfg).await
}

// ============================================================================
// SECTION: Execution Loop
// ============================================================================

/// Walks the plan from `start_index`, enforcing caps, validation, and gates.
async fn execute_from(
    mut run: PipelineRun,
    start_index: usize,
    mut bundle: EvidenceBundle,
    cfg: &ExecutionConfig,
) -> ExecutionResult {
    let node_count = run.spawn_plan.nodes.len();
    for index in start_index..node_count {
        let node = run.spawn_plan.nodes[index].clone();

        // Cumulative cap precheck.
        if let Some(dimension) = tripped_cap(&run) {
            return fail(&mut run, cfg, &PipelineError::CapExceeded {
                dimension,
            })
            .await;
        }

        // Allowlist check before any module lookup.
        if !WorkerType::is_allowed(node.worker_type.as_str()) {
            return fail(&mut run, cfg, &PipelineError::ForbiddenType {
                node_id: node.id.clone(),
                type_name: node.worker_type.as_str().to_string(),
            })
            .await;
        }
        let Some(module) = WorkerRegistry::get(node.worker_type) else {
            return fail(&mut run, cfg, &PipelineError::WorkerError {
                node_id: node.id.clone(),
                summary: format!("no worker module registered for type {}", node.worker_type),
            })
            .await;
        };

        let input = assemble_input(&run, &node);
        let (output, timed_out) = spawn_worker(&run, &node, module, &input, cfg).await;

        if let Err(violation) = validate_worker_output(&output, &node.id, node.worker_type) {
            return fail(&mut run, cfg, &violation).await;
        }

        // Record the validated output and accrue caps before any further
        // decision, so failed runs keep their partial state.
        run.worker_results.insert(node.id.clone(), output.clone());
        run.caps_used.record_worker(output.tokens_used, output.duration_ms);
        run.current_node = Some(node.id.clone());
        if let Err(err) = cfg.store.update_progress(
            &run.tenant_id,
            &run.id,
            &node.id,
            &run.caps_used,
            &run.worker_results,
            cfg.clock.now(),
        ) {
            let what = format!("running run {}: {err}", run.id);
            return fail(&mut run, cfg, &PipelineError::NotFound { what }).await;
        }

        match bundle::worker_artifact(index, &node.id, &output.data, cfg.clock.now()) {
            Ok(artifact) => {
                if let Err(err) = bundle.append_artifact(artifact) {
                    return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                        path: ".evidence".to_string(),
                        reason: err.to_string(),
                    })
                    .await;
                }
            }
            Err(err) => {
                return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                    path: ".data".to_string(),
                    reason: err.to_string(),
                })
                .await;
            }
        }

        // Per-worker token postcheck.
        if output.tokens_used > node.per_worker_caps.max_tokens {
            match run.spawn_plan.governance_level {
                GovernanceLevel::Advisory => {
                    warn!(
                        run_id = %run.id,
                        node_id = %node.id,
                        tokens_used = output.tokens_used,
                        cap = node.per_worker_caps.max_tokens,
                        "per-worker token cap exceeded"
                    );
                }
                GovernanceLevel::Strict | GovernanceLevel::Regulated => {
                    return fail(&mut run, cfg, &PipelineError::CapExceeded {
                        dimension: CapDimension::PerWorkerTokens,
                    })
                    .await;
                }
            }
        }

        // Worker-reported errors end the run before any gate is considered.
        if output.status == WorkerStatus::Error {
            let failure = if timed_out {
                PipelineError::WorkerTimeout {
                    node_id: node.id.clone(),
                }
            } else {
                PipelineError::WorkerError {
                    node_id: node.id.clone(),
                    summary: output.summary.clone(),
                }
            };
            return fail(&mut run, cfg, &failure).await;
        }

        // Durable gate stop.
        if let Some(gate) = run.spawn_plan.gate_after(&node.id).cloned() {
            let gate_state = GateState {
                gate_id: gate.id.clone(),
                after_node: node.id.clone(),
                waiting_since: cfg.clock.now(),
            };
            match cfg.store.pause_at_gate(
                &run.tenant_id,
                &run.id,
                &gate_state,
                &run.caps_used,
                &run.worker_results,
                gate_state.waiting_since,
            ) {
                Ok(true) => {
                    info!(run_id = %run.id, gate_id = %gate.id, "paused at gate");
                    return ExecutionResult {
                        run_id: run.id.clone(),
                        status: ExecutionStatus::PausedAtGate,
                        current_node: Some(node.id.clone()),
                        gate_id: Some(gate.id),
                        error: None,
                        evidence_bundle: None,
                        caps_used: run.caps_used,
                        worker_results: run.worker_results.clone(),
                    };
                }
                Ok(false) => {
                    return ExecutionResult::failed(
                        &run,
                        format!("gate pause rejected for run {}", run.id),
                    );
                }
                Err(err) => return ExecutionResult::failed(&run, err.to_string()),
            }
        }
    }

    complete(run, bundle, cfg).await
}

/// Returns the first cumulative cap dimension the run has reached, if any.
fn tripped_cap(run: &PipelineRun) -> Option<CapDimension> {
    let caps = &run.spawn_plan.caps;
    let used = &run.caps_used;
    if used.workers_spawned >= caps.max_workers {
        Some(CapDimension::Workers)
    } else if used.tokens >= caps.max_tokens {
        Some(CapDimension::Tokens)
    } else if used.runtime_ms >= caps.max_runtime_ms {
        Some(CapDimension::RuntimeMs)
    } else if used.cost_cents >= caps.max_cost_cents {
        Some(CapDimension::CostCents)
    } else {
        None
    }
}

// ============================================================================
// SECTION: Worker Spawn
// ============================================================================

/// Assembles the input map for a node from its incoming edges.
fn assemble_input(run: &PipelineRun, node: &SpawnNode) -> WorkerInput {
    let mut data = BTreeMap::new();
    if node.worker_type == WorkerType::Telemetry {
        for (node_id, output) in &run.worker_results {
            data.insert(node_id.as_str().to_string(), output.data.clone());
        }
    } else {
        for edge in run.spawn_plan.incoming_edges(&node.id) {
            if let Some(source) = run.worker_results.get(&edge.from) {
                data.insert(edge.data_key.clone(), source.data.clone());
            }
        }
    }
    WorkerInput {
        data,
        document_refs: run.spawn_plan.document_refs.clone(),
    }
}

/// Spawns one worker under its per-worker timeout and stamps the output.
///
/// This function is private to the supervisor; workers never obtain a way to
/// spawn siblings.
async fn spawn_worker(
    run: &PipelineRun,
    node: &SpawnNode,
    module: &'static dyn WorkerModule,
    input: &WorkerInput,
    cfg: &ExecutionConfig,
) -> (WorkerOutput, bool) {
    let ctx = ScopedWorkerContext::new(
        cfg.model.clone(),
        cfg.documents.clone(),
        run.tenant_id.clone(),
        ModelCallMetadata {
            role: format!("worker:{}", node.worker_type),
            case_id: run.case_id.clone(),
            purpose: node.label.clone(),
        },
        &cfg.workspace,
        run.id.as_str(),
        PolicyView {
            pii_policy: run.spawn_plan.pii_policy,
            governance_level: run.spawn_plan.governance_level,
            constraints: node.instruction.constraints.clone(),
        },
    );

    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_millis(node.per_worker_caps.max_runtime_ms),
        module.execute(&node.instruction, input, &ctx),
    )
    .await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (draft, timed_out) = match outcome {
        Ok(Ok(draft)) => (draft, false),
        Ok(Err(err)) => (WorkerDraft::error(err.to_string()), false),
        Err(_) => (WorkerDraft::error("timeout"), true),
    };

    (
        WorkerOutput {
            node_id: node.id.clone(),
            worker_type: node.worker_type,
            status: draft.status,
            data: draft.data,
            summary: draft.summary,
            tokens_used: draft.tokens_used,
            duration_ms,
            artifact_paths: draft.artifact_paths,
        },
        timed_out,
    )
}

// ============================================================================
// SECTION: Completion
// ============================================================================

/// Seals the bundle and finishes the run after the last node.
async fn complete(
    mut run: PipelineRun,
    mut bundle: EvidenceBundle,
    cfg: &ExecutionConfig,
) -> ExecutionResult {
    let completed_at = cfg.clock.now();

    for resolution in &run.gate_resolutions {
        if let Err(err) = bundle.record_gate(GateRecord {
            gate_id: resolution.gate_id.clone(),
            approved: resolution.approved,
            resolved_by: resolution.resolved_by.clone(),
            resolved_at: resolution.resolved_at,
            rationale: resolution.rationale.clone(),
        }) {
            return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                path: ".gate_resolutions".to_string(),
                reason: err.to_string(),
            })
            .await;
        }
    }

    let compliance_data = run
        .worker_results
        .values()
        .find(|output| output.worker_type == WorkerType::Compliance)
        .map(|output| output.data.clone());

    let completion_artifacts = [
        (
            "art-9000-gate-records",
            pipeline_gate_core::ArtifactKind::GateRecord,
            "gate_resolutions.json",
            json!(run.gate_resolutions),
            "Gate resolutions in resolution order",
        ),
        (
            "art-9100-policy-compliance",
            pipeline_gate_core::ArtifactKind::PolicyCompliance,
            "policy_compliance.json",
            json!({
                "pii_policy": run.spawn_plan.pii_policy,
                "governance_level": run.spawn_plan.governance_level,
                "compliance": compliance_data,
            }),
            "Policy posture and compliance findings",
        ),
        (
            "art-9200-execution-summary",
            pipeline_gate_core::ArtifactKind::Metadata,
            "execution_summary.json",
            json!({
                "run_id": run.id,
                "plan_hash": run.spawn_plan_hash,
                "workers_spawned": run.caps_used.workers_spawned,
                "tokens": run.caps_used.tokens,
                "cost_cents": run.caps_used.cost_cents,
                "runtime_ms": run.caps_used.runtime_ms,
                "started_at": run.started_at,
                "completed_at": completed_at,
            }),
            "Execution summary",
        ),
    ];
    for (artifact_id, kind, filename, payload, description) in completion_artifacts {
        let artifact = match pipeline_gate_core::EvidenceArtifact::from_payload(
            artifact_id.into(),
            kind,
            filename,
            &payload,
            completed_at,
            description,
            None,
        ) {
            Ok(artifact) => artifact,
            Err(err) => {
                return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                    path: ".evidence".to_string(),
                    reason: err.to_string(),
                })
                .await;
            }
        };
        if let Err(err) = bundle.append_artifact(artifact) {
            return fail(&mut run, cfg, &PipelineError::SchemaViolation {
                path: ".evidence".to_string(),
                reason: err.to_string(),
            })
            .await;
        }
    }

    let seal_steps = bundle
        .set_summary(format!(
            "Run {} completed: {} worker(s), {} token(s)",
            run.id, run.caps_used.workers_spawned, run.caps_used.tokens
        ))
        .and_then(|()| bundle.mark_complete(completed_at))
        .and_then(|()| bundle.seal(completed_at));
    if let Err(err) = seal_steps {
        return fail(&mut run, cfg, &PipelineError::SchemaViolation {
            path: ".evidence".to_string(),
            reason: err.to_string(),
        })
        .await;
    }

    if let Err(err) = bundle::persist_bundle(&cfg.workspace, &bundle).await {
        return fail(&mut run, cfg, &PipelineError::IoSafety {
            filename: err.to_string(),
        })
        .await;
    }

    match cfg.store.complete_run(
        &run.tenant_id,
        &run.id,
        &bundle.bundle_id,
        &run.caps_used,
        &run.worker_results,
        completed_at,
    ) {
        Ok(true) => {}
        Ok(false) => {
            return ExecutionResult::failed(
                &run,
                format!("completion transition rejected for run {}", run.id),
            );
        }
        Err(err) => return ExecutionResult::failed(&run, err.to_string()),
    }
    if let Err(err) = cfg.store.seal_run(&run.tenant_id, &run.id, completed_at) {
        return ExecutionResult::failed(&run, err.to_string());
    }

    info!(
        run_id = %run.id,
        bundle_id = %bundle.bundle_id,
        workers = run.caps_used.workers_spawned,
        "execution completed and sealed"
    );
    run.status = RunStatus::Sealed;
    run.completed_at = Some(completed_at);

    ExecutionResult {
        run_id: run.id.clone(),
        status: ExecutionStatus::Completed,
        current_node: run.current_node.clone(),
        gate_id: None,
        error: None,
        evidence_bundle: Some(bundle),
        caps_used: run.caps_used,
        worker_results: run.worker_results.clone(),
    }
}

// ============================================================================
// SECTION: Failure
// ============================================================================

/// Fails the run terminally, persisting partial state for inspection.
async fn fail(
    run: &mut PipelineRun,
    cfg: &ExecutionConfig,
    failure: &PipelineError,
) -> ExecutionResult {
    let error_text = failure.to_string();
    match failure {
        PipelineError::CapExceeded {
            ..
        }
        | PipelineError::GateRejected {
            ..
        } => {
            warn!(run_id = %run.id, error = %error_text, "run failed");
        }
        _ => {
            error!(
                run_id = %run.id,
                node_id = run.current_node.as_ref().map(NodeId::as_str),
                error = %error_text,
                "run failed"
            );
        }
    }

    let completed_at = cfg.clock.now();
    if let Err(store_err) = cfg.store.fail_run(
        &run.tenant_id,
        &run.id,
        &error_text,
        &run.caps_used,
        &run.worker_results,
        completed_at,
    ) {
        error!(run_id = %run.id, error = %store_err, "failure transition could not be persisted");
    }
    run.status = RunStatus::Failed;
    run.error = Some(error_text.clone());
    run.completed_at = Some(completed_at);

    ExecutionResult::failed(run, error_text)
}
