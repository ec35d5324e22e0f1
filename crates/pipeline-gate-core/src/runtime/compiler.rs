// crates/pipeline-gate-core/src/runtime/compiler.rs
// ============================================================================
// Module: Pipeline Gate Pack Compiler
// Description: Compiles a declarative pipeline description into a spawn plan.
// Purpose: Produce deterministic, validated, content-addressable plans.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The pack compiler turns a declarative pipeline description into an
//! executable spawn plan. Topology is chosen by a domain-selected builder
//! and is deterministic given inputs; instruction text is templated but
//! structure is never chosen by a model. The assembled plan is validated in
//! full before the structural hash is computed, so an invalid description
//! never produces a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::PipelineError;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::GateId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::PlanId;
use crate::core::plan::AuthorityLevel;
use crate::core::plan::DocumentRef;
use crate::core::plan::GateSpec;
use crate::core::plan::GovernanceLevel;
use crate::core::plan::PLAN_VERSION;
use crate::core::plan::PerWorkerCaps;
use crate::core::plan::PiiPolicy;
use crate::core::plan::PlanEdge;
use crate::core::plan::RunCaps;
use crate::core::plan::SpawnNode;
use crate::core::plan::SpawnPlan;
use crate::core::plan::WorkerInstruction;
use crate::core::plan::hash_spawn_plan;
use crate::core::time::Timestamp;
use crate::core::validate::validate_plan;
use crate::core::worker::WorkerType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Constraint token that forces the no-raw-PII policy.
const NO_PII_CONSTRAINT: &str = "no-pii";

/// Domain label served by the VA claims builder.
const VA_CLAIMS_DOMAIN: &str = "va-claims";

// ============================================================================
// SECTION: Compiler Input
// ============================================================================

/// Declarative pipeline description submitted by callers.
///
/// # Invariants
/// - `domain` selects the plan builder; unknown domains use the generic
///   builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Requested worker roles (advisory; topology stays builder-controlled).
    #[serde(default)]
    pub roles: Vec<String>,
    /// Application domain.
    pub domain: String,
    /// Governance level selecting default caps.
    pub governance_level: GovernanceLevel,
    /// Declarative pipeline constraints.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Declared input descriptions.
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Declared output descriptions.
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Full compile request: pipeline description plus bound documents.
///
/// # Invariants
/// - `documents` were uploaded by the same tenant before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileRequest {
    /// Declarative pipeline description.
    pub pipeline: PipelineConfig,
    /// Optional external case identifier.
    pub case_id: Option<CaseId>,
    /// Documents available to the run.
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

/// Compiler output: the validated plan and its content address.
///
/// # Invariants
/// - `plan_hash` is the SHA-256 of `normalized_json`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPlan {
    /// Validated spawn plan.
    pub plan: SpawnPlan,
    /// Structural hash of the plan.
    pub plan_hash: HashDigest,
    /// Canonical JSON encoding of the structural plan fields.
    pub normalized_json: String,
}

// ============================================================================
// SECTION: Plan Builders
// ============================================================================

/// Closed set of deterministic plan builders.
///
/// # Invariants
/// - Builder selection depends only on the pipeline domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanBuilder {
    /// Six-node VA claims pipeline with two approval gates.
    VaClaims,
    /// Minimal four-node pipeline with one final gate.
    Generic,
}

impl PlanBuilder {
    /// Selects the builder for a domain.
    fn for_domain(domain: &str) -> Self {
        if domain == VA_CLAIMS_DOMAIN {
            Self::VaClaims
        } else {
            Self::Generic
        }
    }

    /// Returns the ordered worker types this builder emits.
    const fn node_types(self) -> &'static [WorkerType] {
        match self {
            Self::VaClaims => &[
                WorkerType::Gateway,
                WorkerType::Extractor,
                WorkerType::Validator,
                WorkerType::Compliance,
                WorkerType::Writer,
                WorkerType::Telemetry,
            ],
            Self::Generic => &[
                WorkerType::Gateway,
                WorkerType::Extractor,
                WorkerType::Writer,
                WorkerType::Telemetry,
            ],
        }
    }

    /// Returns the data key carried on the edge out of a worker type.
    const fn edge_data_key(worker_type: WorkerType) -> &'static str {
        match worker_type {
            WorkerType::Gateway => "documents",
            WorkerType::Extractor => "evidence",
            WorkerType::Validator => "validation",
            WorkerType::Compliance => "compliance",
            WorkerType::Writer => "report",
            _ => "upstream",
        }
    }

    /// Builds the gates for this topology from the built nodes.
    fn gates(self, governance_level: GovernanceLevel, nodes: &[SpawnNode]) -> Vec<GateSpec> {
        let node_id_of = |worker_type: WorkerType| {
            nodes.iter().find(|node| node.worker_type == worker_type).map(|node| node.id.clone())
        };
        match self {
            Self::VaClaims => {
                let mut gates = Vec::with_capacity(2);
                if let Some(after_node) = node_id_of(WorkerType::Validator) {
                    gates.push(GateSpec {
                        id: GateId::new("gate-validation-review"),
                        after_node,
                        label: "Validation review".to_string(),
                        description: "Review cross-checked evidence before compliance scanning."
                            .to_string(),
                        requires_approval: true,
                        authority_level: AuthorityLevel::Mandatory,
                    });
                }
                if let Some(after_node) = node_id_of(WorkerType::Writer) {
                    gates.push(GateSpec {
                        id: GateId::new("gate-final-approval"),
                        after_node,
                        label: "Final approval".to_string(),
                        description: "Approve the synthesized report before sealing.".to_string(),
                        requires_approval: true,
                        authority_level: AuthorityLevel::Mandatory,
                    });
                }
                gates
            }
            Self::Generic => {
                let requires_approval = matches!(
                    governance_level,
                    GovernanceLevel::Strict | GovernanceLevel::Regulated
                );
                node_id_of(WorkerType::Writer)
                    .map(|after_node| {
                        vec![GateSpec {
                            id: GateId::new("gate-final-review"),
                            after_node,
                            label: "Final review".to_string(),
                            description: "Review the synthesized report before sealing."
                                .to_string(),
                            requires_approval,
                            authority_level: if requires_approval {
                                AuthorityLevel::Mandatory
                            } else {
                                AuthorityLevel::Advisory
                            },
                        }]
                    })
                    .unwrap_or_default()
            }
        }
    }
}

// ============================================================================
// SECTION: Instruction Templates
// ============================================================================

/// Returns the templated system prompt for a worker type.
fn system_prompt_for(worker_type: WorkerType, domain: &str) -> String {
    let role = match worker_type {
        WorkerType::Gateway => "You validate uploaded documents and declare run readiness.",
        WorkerType::Extractor => "You extract structured facts from document contents.",
        WorkerType::Validator => "You cross-check extracted facts for internal consistency.",
        WorkerType::Compliance => "You scan outputs for PII and regulatory eligibility.",
        WorkerType::Writer => "You synthesize a precise markdown report from prior outputs.",
        WorkerType::Telemetry => "You hash upstream outputs and assemble the run manifest.",
        _ => "You perform a scoped pipeline task.",
    };
    format!("{role} Domain: {domain}. Work only from the provided inputs.")
}

/// Returns the templated task description for a worker type.
fn task_description_for(worker_type: WorkerType, config: &PipelineConfig) -> String {
    let inputs = if config.inputs.is_empty() {
        "the uploaded documents".to_string()
    } else {
        config.inputs.join(", ")
    };
    let outputs = if config.outputs.is_empty() {
        "a structured result".to_string()
    } else {
        config.outputs.join(", ")
    };
    match worker_type {
        WorkerType::Gateway => format!("Inventory {inputs} and decide whether the run may proceed."),
        WorkerType::Extractor => format!("Extract the facts needed to produce {outputs} from {inputs}."),
        WorkerType::Validator => "Cross-check the extracted facts and score their consistency.".to_string(),
        WorkerType::Compliance => "Scan extracted facts for PII findings and eligibility issues.".to_string(),
        WorkerType::Writer => format!("Synthesize {outputs} as a markdown report with full traceability."),
        WorkerType::Telemetry => "Hash all upstream outputs and emit the evidence manifest.".to_string(),
        _ => format!("Process {inputs} toward {outputs}."),
    }
}

// ============================================================================
// SECTION: Compilation
// ============================================================================

/// Derives the PII policy from constraints and governance level.
#[must_use]
pub fn derive_pii_policy(constraints: &[String], governance_level: GovernanceLevel) -> PiiPolicy {
    if constraints.iter().any(|constraint| constraint == NO_PII_CONSTRAINT) {
        PiiPolicy::NoRawPii
    } else if governance_level == GovernanceLevel::Regulated {
        PiiPolicy::PiiEncrypted
    } else {
        PiiPolicy::PiiAllowed
    }
}

/// Compiles a pipeline description into a validated, content-addressed plan.
///
/// Topology is deterministic given the request; `plan_id` and `created_at`
/// are caller-supplied and excluded from the structural hash.
///
/// # Errors
///
/// Returns [`PipelineError::PlanInvalid`] listing every violated invariant,
/// or a hashing failure wrapped as a violation when canonicalization fails.
pub fn compile(
    request: &CompileRequest,
    plan_id: PlanId,
    created_at: Timestamp,
) -> Result<CompiledPlan, PipelineError> {
    let builder = PlanBuilder::for_domain(&request.pipeline.domain);
    let governance_level = request.pipeline.governance_level;
    let node_types = builder.node_types();

    let mut nodes = Vec::with_capacity(node_types.len());
    let mut edges = Vec::with_capacity(node_types.len().saturating_sub(1));
    let mut previous: Option<(NodeId, WorkerType)> = None;

    for worker_type in node_types {
        let id_raw = format!("node-{}", worker_type.as_str());
        let Some(id) = NodeId::parse(&id_raw) else {
            return Err(PipelineError::PlanInvalid {
                violations: vec![format!("builder emitted invalid node id {id_raw}")],
            });
        };
        let depends_on = previous.as_ref().map(|(prev, _)| vec![prev.clone()]).unwrap_or_default();
        if let Some((prev_id, prev_type)) = &previous {
            edges.push(PlanEdge {
                from: prev_id.clone(),
                to: id.clone(),
                data_key: PlanBuilder::edge_data_key(*prev_type).to_string(),
            });
        }
        nodes.push(SpawnNode {
            id: id.clone(),
            worker_type: *worker_type,
            label: format!("{} ({})", worker_type.as_str(), request.pipeline.domain),
            instruction: WorkerInstruction {
                system_prompt: system_prompt_for(*worker_type, &request.pipeline.domain),
                task_description: task_description_for(*worker_type, &request.pipeline),
                constraints: request.pipeline.constraints.clone(),
                output_format: match worker_type {
                    WorkerType::Writer => Some("markdown".to_string()),
                    _ => Some("json".to_string()),
                },
            },
            authority_level: match worker_type {
                WorkerType::Compliance | WorkerType::Validator => AuthorityLevel::Mandatory,
                WorkerType::Telemetry => AuthorityLevel::Informational,
                _ => AuthorityLevel::Advisory,
            },
            per_worker_caps: PerWorkerCaps::for_worker(*worker_type),
            depends_on,
        });
        previous = Some((id, *worker_type));
    }

    let gates = builder.gates(governance_level, &nodes);
    let plan = SpawnPlan {
        plan_id,
        version: PLAN_VERSION.to_string(),
        created_at,
        domain: request.pipeline.domain.clone(),
        case_id: request.case_id.clone(),
        nodes,
        edges,
        gates,
        caps: RunCaps::for_governance(governance_level),
        pii_policy: derive_pii_policy(&request.pipeline.constraints, governance_level),
        governance_level,
        document_refs: request.documents.clone(),
    };

    validate_plan(&plan)?;

    let (plan_hash, normalized_json) = hash_spawn_plan(&plan).map_err(|err| {
        PipelineError::PlanInvalid {
            violations: vec![format!("plan canonicalization failed: {err}")],
        }
    })?;

    Ok(CompiledPlan {
        plan,
        plan_hash,
        normalized_json,
    })
}
