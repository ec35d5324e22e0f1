// crates/pipeline-gate-core/src/core/error.rs
// ============================================================================
// Module: Pipeline Gate Error Taxonomy
// Description: Stable error taxonomy surfaced to callers and run records.
// Purpose: Map every failure mode to one programmatically stable variant.
// Dependencies: thiserror, crate::core::identifiers
// ============================================================================

//! ## Overview
//! Every failure the engine can surface is one of these variants. Failures
//! are non-retryable at this layer; a higher layer may re-compile and start
//! a new run. The rendered message of a variant becomes the run record's
//! `error` field when the failure terminates a run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::GateId;
use crate::core::identifiers::NodeId;

// ============================================================================
// SECTION: Cap Dimensions
// ============================================================================

/// Resource dimension that tripped a cap check.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapDimension {
    /// Run-level worker count cap.
    Workers,
    /// Run-level cumulative token cap.
    Tokens,
    /// Run-level cumulative cost cap.
    CostCents,
    /// Run-level cumulative runtime cap.
    RuntimeMs,
    /// Per-worker token cap.
    PerWorkerTokens,
}

impl CapDimension {
    /// Returns the stable label for the dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Workers => "max_workers",
            Self::Tokens => "max_tokens",
            Self::CostCents => "max_cost_cents",
            Self::RuntimeMs => "max_runtime_ms",
            Self::PerWorkerTokens => "per_worker_max_tokens",
        }
    }
}

// ============================================================================
// SECTION: Pipeline Errors
// ============================================================================

/// Failure taxonomy surfaced to callers and persisted on failed runs.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed raw worker output data.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Plan failed structural validation at compile; no run was created.
    #[error("plan invalid: {}", violations.join("; "))]
    PlanInvalid {
        /// Every violated invariant, in detection order.
        violations: Vec<String>,
    },
    /// Node type is outside the worker allowlist.
    #[error("forbidden worker type {type_name} on node {node_id}")]
    ForbiddenType {
        /// Node carrying the forbidden type.
        node_id: NodeId,
        /// Raw type label encountered.
        type_name: String,
    },
    /// A hard resource cap was (or would be) exceeded.
    #[error("cap exceeded: {}", dimension.as_str())]
    CapExceeded {
        /// Dimension that tripped.
        dimension: CapDimension,
    },
    /// Worker output failed schema validation.
    #[error("schema violation at {path}: {reason}")]
    SchemaViolation {
        /// Path of the offending field.
        path: String,
        /// Reason the field was rejected.
        reason: String,
    },
    /// Worker output contained a spawn-directive key.
    #[error("forbidden key at {path}")]
    ForbiddenKey {
        /// Path of the forbidden key.
        path: String,
    },
    /// Worker reported a terminal error.
    #[error("worker {node_id} failed: {summary}")]
    WorkerError {
        /// Failing node.
        node_id: NodeId,
        /// Worker-reported failure summary.
        summary: String,
    },
    /// Worker exceeded its per-worker runtime budget.
    #[error("worker {node_id} timed out")]
    WorkerTimeout {
        /// Timed-out node.
        node_id: NodeId,
    },
    /// A human rejected a gate.
    #[error("gate {gate_id} rejected by {resolved_by}{}", rationale.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    GateRejected {
        /// Rejected gate.
        gate_id: GateId,
        /// Identity of the resolver.
        resolved_by: String,
        /// Optional rejection rationale.
        rationale: Option<String>,
    },
    /// Artifact name failed filesystem safety validation.
    #[error("unsafe artifact name: {filename}")]
    IoSafety {
        /// Offending filename.
        filename: String,
    },
    /// Referenced entity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },
    /// Caller is not the owning tenant.
    #[error("tenant mismatch")]
    NotTenant,
}
