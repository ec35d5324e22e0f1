// crates/pipeline-gate-core/src/core/run.rs
// ============================================================================
// Module: Pipeline Gate Run State
// Description: Persistent run records, gate state, and cumulative caps.
// Purpose: Capture everything a resume needs so no supervisor state is
// authoritative between gate entry and resolution.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! A pipeline run is the persistent record of one execution of one plan.
//! After a gate pause commits, the run's `worker_results` and `caps_used`
//! are sufficient for `resume_after_gate` to continue without any in-memory
//! supervisor state. Gate resolutions are appended in the same store update
//! that transitions status, so resolution and state stay atomic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::GateId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::TenantId;
use crate::core::plan::SpawnPlan;
use crate::core::time::Timestamp;
use crate::core::worker::WorkerOutput;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Run lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - Transitions are enforced by the run store's status guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is compiled and waiting for execution.
    Pending,
    /// Run is executing.
    Running,
    /// Run is durably paused at an approval gate.
    PausedAtGate,
    /// Run completed; evidence bundle is attached.
    Completed,
    /// Run failed terminally.
    Failed,
    /// Run and its evidence bundle are sealed and immutable.
    Sealed,
}

impl RunStatus {
    /// Returns the stable wire label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::PausedAtGate => "paused_at_gate",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Sealed => "sealed",
        }
    }

    /// Looks up a status by wire label.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "paused_at_gate" => Some(Self::PausedAtGate),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "sealed" => Some(Self::Sealed),
            _ => None,
        }
    }

    /// Reports whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Sealed)
    }
}

// ============================================================================
// SECTION: Gate State
// ============================================================================

/// Durable record of the gate a run is paused at.
///
/// # Invariants
/// - Present exactly while the run status is `paused_at_gate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    /// Gate the run is paused at.
    pub gate_id: GateId,
    /// Node whose completion triggered the gate.
    pub after_node: NodeId,
    /// Timestamp when the pause committed.
    pub waiting_since: Timestamp,
}

/// Recorded human decision for one gate.
///
/// # Invariants
/// - Appended in the same store update that transitions run status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResolution {
    /// Gate that was resolved.
    pub gate_id: GateId,
    /// Whether the gate was approved.
    pub approved: bool,
    /// Resolution timestamp.
    pub resolved_at: Timestamp,
    /// Identity of the resolver.
    pub resolved_by: String,
    /// Optional rationale supplied by the resolver.
    pub rationale: Option<String>,
}

// ============================================================================
// SECTION: Cumulative Caps
// ============================================================================

/// Cumulative resource consumption for a run.
///
/// # Invariants
/// - Never exceeds the owning plan's caps on a non-failed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsUsed {
    /// Cumulative tokens consumed.
    pub tokens: u64,
    /// Cumulative model cost in cents.
    pub cost_cents: u64,
    /// Cumulative worker runtime in milliseconds.
    pub runtime_ms: u64,
    /// Workers spawned so far.
    pub workers_spawned: u32,
}

impl CapsUsed {
    /// Accrues one worker completion into the cumulative counters.
    ///
    /// Cost accrues at a flat `ceil(tokens / 1000)` cents.
    pub fn record_worker(&mut self, tokens_used: u64, duration_ms: u64) {
        self.tokens = self.tokens.saturating_add(tokens_used);
        self.runtime_ms = self.runtime_ms.saturating_add(duration_ms);
        self.workers_spawned = self.workers_spawned.saturating_add(1);
        self.cost_cents = self.cost_cents.saturating_add(tokens_used.div_ceil(1_000));
    }
}

// ============================================================================
// SECTION: Pipeline Run
// ============================================================================

/// Persistent record of one execution of one plan.
///
/// # Invariants
/// - Exclusively mutated through the run store's guarded transitions.
/// - Once `status` is `sealed`, the record and its bundle are immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier.
    pub id: RunId,
    /// Optional external case identifier.
    pub case_id: Option<CaseId>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The compiled plan this run executes.
    pub spawn_plan: SpawnPlan,
    /// Structural hash of the plan.
    pub spawn_plan_hash: HashDigest,
    /// Lifecycle status.
    pub status: RunStatus,
    /// Node currently (or most recently) executed.
    pub current_node: Option<NodeId>,
    /// Gate pause state, present while paused.
    pub gate_state: Option<GateState>,
    /// Validated outputs keyed by node identifier.
    pub worker_results: BTreeMap<NodeId, WorkerOutput>,
    /// Evidence bundle reference, set at completion.
    pub evidence_bundle_id: Option<BundleId>,
    /// Cumulative resource consumption.
    pub caps_used: CapsUsed,
    /// Terminal error description for failed runs.
    pub error: Option<String>,
    /// Recorded gate decisions in resolution order.
    pub gate_resolutions: Vec<GateResolution>,
    /// Execution start timestamp.
    pub started_at: Option<Timestamp>,
    /// Terminal timestamp for completed and failed runs.
    pub completed_at: Option<Timestamp>,
    /// Record creation timestamp.
    pub created_at: Timestamp,
    /// Last update timestamp.
    pub updated_at: Timestamp,
}

impl PipelineRun {
    /// Creates a pending run for a freshly compiled plan.
    #[must_use]
    pub fn pending(
        tenant_id: TenantId,
        spawn_plan: SpawnPlan,
        spawn_plan_hash: HashDigest,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: RunId::generate(),
            case_id: spawn_plan.case_id.clone(),
            tenant_id,
            spawn_plan,
            spawn_plan_hash,
            status: RunStatus::Pending,
            current_node: None,
            gate_state: None,
            worker_results: BTreeMap::new(),
            evidence_bundle_id: None,
            caps_used: CapsUsed::default(),
            error: None,
            gate_resolutions: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}
