// crates/pipeline-gate-core/src/core/plan.rs
// ============================================================================
// Module: Pipeline Gate Spawn Plan
// Description: Immutable spawn plan, nodes, edges, gates, caps, and policies.
// Purpose: Describe one executable run as a content-addressable structure.
// Dependencies: serde, crate::core::{hashing, identifiers, time, worker}
// ============================================================================

//! ## Overview
//! A spawn plan is the immutable, content-addressable description of one
//! executable run. Topology is compiler-controlled and deterministic given
//! inputs; worker instruction text may be templated but structure is never
//! chosen by a model. The structural hash excludes `plan_id` and
//! `created_at` so that identical structural inputs always produce the same
//! hash across processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_json_bytes;
use crate::core::hashing::hash_bytes;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::DocId;
use crate::core::identifiers::GateId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::PlanId;
use crate::core::time::Timestamp;
use crate::core::worker::WorkerType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Fixed spawn plan format version.
pub const PLAN_VERSION: &str = "1.0.0";

/// Minimum number of nodes in a valid plan.
pub const MIN_PLAN_NODES: usize = 2;

/// Maximum number of nodes in a valid plan.
pub const MAX_PLAN_NODES: usize = 12;

/// Maximum number of constraints per worker instruction.
pub const MAX_INSTRUCTION_CONSTRAINTS: usize = 10;

/// Default per-worker token budget.
pub const DEFAULT_WORKER_MAX_TOKENS: u64 = 32_768;

/// Default per-worker runtime budget in milliseconds.
pub const DEFAULT_WORKER_MAX_RUNTIME_MS: u64 = 60_000;

/// Per-worker token budget granted to writer nodes.
pub const WRITER_MAX_TOKENS: u64 = 65_536;

/// Per-worker runtime budget in milliseconds granted to writer nodes.
pub const WRITER_MAX_RUNTIME_MS: u64 = 120_000;

// ============================================================================
// SECTION: Governance
// ============================================================================

/// Governance level selecting default run caps and gate strictness.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceLevel {
    /// Advisory oversight; generous caps, gates informational by default.
    Advisory,
    /// Strict oversight; tight caps, approval gates enforced.
    Strict,
    /// Regulated oversight; tightest caps, approval gates enforced.
    Regulated,
}

impl GovernanceLevel {
    /// Returns the stable wire label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advisory => "advisory",
            Self::Strict => "strict",
            Self::Regulated => "regulated",
        }
    }
}

/// Declarative stance on personal data within a run.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PiiPolicy {
    /// No raw PII may pass through worker outputs.
    #[serde(rename = "NO_RAW_PII")]
    NoRawPii,
    /// PII may appear in worker outputs.
    #[serde(rename = "PII_ALLOWED")]
    PiiAllowed,
    /// PII must be encrypted at rest by the document layer.
    #[serde(rename = "PII_ENCRYPTED")]
    PiiEncrypted,
}

/// Per-action governance tag carried by nodes and gates.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityLevel {
    /// Output is informational only.
    #[serde(rename = "INFORMATIONAL")]
    Informational,
    /// Output advises downstream consumers.
    #[serde(rename = "ADVISORY")]
    Advisory,
    /// Output is binding and forces a gate.
    #[serde(rename = "MANDATORY")]
    Mandatory,
}

// ============================================================================
// SECTION: Caps
// ============================================================================

/// Hard limits for a whole run.
///
/// # Invariants
/// - Every limit is greater than zero in a valid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCaps {
    /// Maximum workers spawned over the run.
    pub max_workers: u32,
    /// Maximum cumulative tokens over the run.
    pub max_tokens: u64,
    /// Maximum cumulative model cost in cents.
    pub max_cost_cents: u64,
    /// Maximum cumulative runtime in milliseconds.
    pub max_runtime_ms: u64,
    /// Maximum concurrent sibling workers (declared; v1 executes
    /// sequentially).
    pub max_parallel: u32,
}

impl RunCaps {
    /// Returns the default caps for a governance level.
    #[must_use]
    pub const fn for_governance(level: GovernanceLevel) -> Self {
        match level {
            GovernanceLevel::Advisory => Self {
                max_workers: 12,
                max_tokens: 200_000,
                max_cost_cents: 500,
                max_runtime_ms: 600_000,
                max_parallel: 2,
            },
            GovernanceLevel::Strict => Self {
                max_workers: 12,
                max_tokens: 150_000,
                max_cost_cents: 300,
                max_runtime_ms: 450_000,
                max_parallel: 1,
            },
            GovernanceLevel::Regulated => Self {
                max_workers: 12,
                max_tokens: 100_000,
                max_cost_cents: 200,
                max_runtime_ms: 300_000,
                max_parallel: 1,
            },
        }
    }
}

/// Hard limits for a single worker spawn.
///
/// # Invariants
/// - Both limits are greater than zero in a valid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerWorkerCaps {
    /// Maximum tokens for one worker execution.
    pub max_tokens: u64,
    /// Maximum runtime in milliseconds for one worker execution.
    pub max_runtime_ms: u64,
}

impl PerWorkerCaps {
    /// Returns the default per-worker caps for a worker type.
    #[must_use]
    pub const fn for_worker(worker_type: WorkerType) -> Self {
        match worker_type {
            WorkerType::Writer => Self {
                max_tokens: WRITER_MAX_TOKENS,
                max_runtime_ms: WRITER_MAX_RUNTIME_MS,
            },
            _ => Self {
                max_tokens: DEFAULT_WORKER_MAX_TOKENS,
                max_runtime_ms: DEFAULT_WORKER_MAX_RUNTIME_MS,
            },
        }
    }
}

// ============================================================================
// SECTION: Nodes, Edges, Gates
// ============================================================================

/// Instruction handed to a worker at spawn time.
///
/// # Invariants
/// - `constraints` holds at most [`MAX_INSTRUCTION_CONSTRAINTS`] entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInstruction {
    /// System prompt framing the worker's role.
    pub system_prompt: String,
    /// Task description for this specific node.
    pub task_description: String,
    /// Declarative constraints the worker must honor.
    pub constraints: Vec<String>,
    /// Optional required output format hint.
    pub output_format: Option<String>,
}

/// One executable node in a spawn plan.
///
/// # Invariants
/// - `id` matches the canonical node pattern.
/// - `depends_on` identifiers resolve within the owning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnNode {
    /// Node identifier.
    pub id: NodeId,
    /// Worker type drawn from the closed allowlist.
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    /// Human-readable node label.
    pub label: String,
    /// Instruction handed to the worker.
    pub instruction: WorkerInstruction,
    /// Governance authority of this node's output.
    pub authority_level: AuthorityLevel,
    /// Hard limits for this node's execution.
    pub per_worker_caps: PerWorkerCaps,
    /// Upstream nodes this node depends on.
    pub depends_on: Vec<NodeId>,
}

/// Directed data-flow edge between two plan nodes.
///
/// # Invariants
/// - Both endpoints resolve to node identifiers within the owning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEdge {
    /// Producing node identifier.
    pub from: NodeId,
    /// Consuming node identifier.
    pub to: NodeId,
    /// Key under which the producer's data appears in the consumer's input.
    pub data_key: String,
}

/// Human-approval gate attached to a plan node.
///
/// # Invariants
/// - `after_node` resolves to a node identifier within the owning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateSpec {
    /// Gate identifier.
    pub id: GateId,
    /// Node after which the gate takes effect.
    pub after_node: NodeId,
    /// Human-readable gate label.
    pub label: String,
    /// Description shown to the approver.
    pub description: String,
    /// Whether execution must pause for an approval.
    pub requires_approval: bool,
    /// Governance authority of the gate.
    pub authority_level: AuthorityLevel,
}

/// Reference to an uploaded document consumed by a run.
///
/// # Invariants
/// - `content_hash` matches the stored document bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document identifier.
    pub doc_id: DocId,
    /// Original filename.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// SHA-256 of the document bytes.
    pub content_hash: HashDigest,
    /// Document size in bytes.
    pub size_bytes: u64,
}

// ============================================================================
// SECTION: Spawn Plan
// ============================================================================

/// Immutable, content-addressable description of one executable run.
///
/// # Invariants
/// - `nodes` is an ordered sequence of 2 to 12 entries; the first node is a
///   gateway and the last is a telemetry node.
/// - All edge, gate, and dependency identifiers resolve to nodes in this
///   plan.
/// - The structural hash is independent of `plan_id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPlan {
    /// Plan identifier.
    pub plan_id: PlanId,
    /// Plan format version (always [`PLAN_VERSION`]).
    pub version: String,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Application domain that selected the plan builder.
    pub domain: String,
    /// Optional external case identifier.
    pub case_id: Option<CaseId>,
    /// Ordered executable nodes.
    pub nodes: Vec<SpawnNode>,
    /// Data-flow edges.
    pub edges: Vec<PlanEdge>,
    /// Human-approval gates.
    pub gates: Vec<GateSpec>,
    /// Hard limits for the whole run.
    pub caps: RunCaps,
    /// Declarative stance on personal data.
    pub pii_policy: PiiPolicy,
    /// Governance level that selected default caps.
    pub governance_level: GovernanceLevel,
    /// Documents available to the run.
    pub document_refs: Vec<DocumentRef>,
}

impl SpawnPlan {
    /// Returns the node with the given identifier, if present.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&SpawnNode> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Returns the position of a node within the ordered sequence.
    #[must_use]
    pub fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|node| &node.id == id)
    }

    /// Returns the approval gate attached after the given node, if any.
    #[must_use]
    pub fn gate_after(&self, node_id: &NodeId) -> Option<&GateSpec> {
        self.gates.iter().find(|gate| &gate.after_node == node_id && gate.requires_approval)
    }

    /// Returns the gate with the given identifier, if present.
    #[must_use]
    pub fn gate(&self, gate_id: &GateId) -> Option<&GateSpec> {
        self.gates.iter().find(|gate| &gate.id == gate_id)
    }

    /// Returns the incoming edges of a node in declaration order.
    #[must_use]
    pub fn incoming_edges(&self, node_id: &NodeId) -> Vec<&PlanEdge> {
        self.edges.iter().filter(|edge| &edge.to == node_id).collect()
    }
}

// ============================================================================
// SECTION: Structural Hashing
// ============================================================================

/// Structural projection of a spawn plan used for content addressing.
///
/// # Invariants
/// - Excludes `plan_id` and `created_at`.
/// - Collections are sorted deterministically before encoding.
#[derive(Debug, Serialize)]
struct StructuralPlan<'a> {
    /// Plan format version.
    version: &'a str,
    /// Application domain.
    domain: &'a str,
    /// Optional external case identifier.
    case_id: Option<&'a CaseId>,
    /// Nodes sorted by identifier.
    nodes: Vec<&'a SpawnNode>,
    /// Edges sorted by `(from, to)`.
    edges: Vec<&'a PlanEdge>,
    /// Gates sorted by `after_node`.
    gates: Vec<&'a GateSpec>,
    /// Hard limits for the whole run.
    caps: &'a RunCaps,
    /// Declarative stance on personal data.
    pii_policy: PiiPolicy,
    /// Governance level.
    governance_level: GovernanceLevel,
    /// Document references sorted by document identifier.
    document_refs: Vec<&'a DocumentRef>,
}

impl<'a> StructuralPlan<'a> {
    /// Builds the sorted structural projection of a plan.
    fn of(plan: &'a SpawnPlan) -> Self {
        let mut nodes: Vec<&SpawnNode> = plan.nodes.iter().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<&PlanEdge> = plan.edges.iter().collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        let mut gates: Vec<&GateSpec> = plan.gates.iter().collect();
        gates.sort_by(|a, b| a.after_node.cmp(&b.after_node));
        let mut document_refs: Vec<&DocumentRef> = plan.document_refs.iter().collect();
        document_refs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        Self {
            version: &plan.version,
            domain: &plan.domain,
            case_id: plan.case_id.as_ref(),
            nodes,
            edges,
            gates,
            caps: &plan.caps,
            pii_policy: plan.pii_policy,
            governance_level: plan.governance_level,
            document_refs,
        }
    }
}

/// Computes the structural hash and normalized JSON encoding of a plan.
///
/// Identical structural inputs always produce the same hash across
/// processes, regardless of `plan_id`, `created_at`, or collection order.
///
/// # Errors
///
/// Returns [`HashError`] when canonicalization fails.
pub fn hash_spawn_plan(plan: &SpawnPlan) -> Result<(HashDigest, String), HashError> {
    let structural = StructuralPlan::of(plan);
    let bytes = canonical_json_bytes(&structural)?;
    let normalized = String::from_utf8(bytes.clone())
        .map_err(|err| HashError::Canonicalization(err.to_string()))?;
    Ok((hash_bytes(&bytes), normalized))
}
