// crates/pipeline-gate-core/src/core/worker.rs
// ============================================================================
// Module: Pipeline Gate Worker Model
// Description: Closed worker-type allowlist and worker output records.
// Purpose: Make the allowlist invariant syntactic and define validated outputs.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The worker-type allowlist is a closed enumeration. Any type outside this
//! set fails deserialization at the boundary and is re-checked before every
//! spawn, so the set of executable worker kinds is fixed at compile time.
//! Worker outputs are plain records; the supervisor validates them before
//! they are persisted or fed downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::NodeId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of characters allowed in a worker output summary.
pub const MAX_SUMMARY_CHARS: usize = 2_000;

/// Maximum depth inspected by the forbidden-key scan.
pub const MAX_DATA_DEPTH: usize = 32;

/// Keys that must never appear, at any depth, in worker output data.
///
/// A worker emitting any of these is treated as attempting to inject a spawn
/// directive back into the control plane.
pub const FORBIDDEN_DATA_KEYS: [&str; 6] =
    ["spawnPlan", "spawn_plan", "nodes", "edges", "gates", "spawnDirective"];

// ============================================================================
// SECTION: Worker Types
// ============================================================================

/// Closed allowlist of spawnable worker types.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - No type outside this enumeration can be compiled into a plan or spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// Validates uploaded documents and declares run readiness.
    Gateway,
    /// Normalizes raw submissions into a working set.
    Intake,
    /// Extracts structured facts from document contents.
    Extractor,
    /// Performs free-form analysis over extracted facts.
    Analyzer,
    /// Scans for PII and regulatory eligibility.
    Compliance,
    /// Scores extracted facts against rubric criteria.
    Scorer,
    /// Synthesizes narrative reports from prior outputs.
    Writer,
    /// Assembles derived artifacts from prior outputs.
    Builder,
    /// Cross-checks prior outputs for internal consistency.
    Validator,
    /// Reviews outputs for quality before release.
    Qa,
    /// Coordinates sub-pipeline activity.
    Supervisor,
    /// Hashes upstream outputs and emits the run manifest.
    Telemetry,
}

/// Every allowlisted worker type, in declaration order.
pub const WORKER_TYPE_ALLOWLIST: [WorkerType; 12] = [
    WorkerType::Gateway,
    WorkerType::Intake,
    WorkerType::Extractor,
    WorkerType::Analyzer,
    WorkerType::Compliance,
    WorkerType::Scorer,
    WorkerType::Writer,
    WorkerType::Builder,
    WorkerType::Validator,
    WorkerType::Qa,
    WorkerType::Supervisor,
    WorkerType::Telemetry,
];

impl WorkerType {
    /// Returns the stable wire label for the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Intake => "intake",
            Self::Extractor => "extractor",
            Self::Analyzer => "analyzer",
            Self::Compliance => "compliance",
            Self::Scorer => "scorer",
            Self::Writer => "writer",
            Self::Builder => "builder",
            Self::Validator => "validator",
            Self::Qa => "qa",
            Self::Supervisor => "supervisor",
            Self::Telemetry => "telemetry",
        }
    }

    /// Looks up a worker type by wire label (returns `None` for anything
    /// outside the allowlist).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "gateway" => Some(Self::Gateway),
            "intake" => Some(Self::Intake),
            "extractor" => Some(Self::Extractor),
            "analyzer" => Some(Self::Analyzer),
            "compliance" => Some(Self::Compliance),
            "scorer" => Some(Self::Scorer),
            "writer" => Some(Self::Writer),
            "builder" => Some(Self::Builder),
            "validator" => Some(Self::Validator),
            "qa" => Some(Self::Qa),
            "supervisor" => Some(Self::Supervisor),
            "telemetry" => Some(Self::Telemetry),
            _ => None,
        }
    }

    /// Reports whether a wire label names an allowlisted type.
    #[must_use]
    pub fn is_allowed(label: &str) -> bool {
        Self::from_label(label).is_some()
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Worker Output
// ============================================================================

/// Worker completion status.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Worker completed successfully.
    Success,
    /// Worker failed; the summary carries the reason.
    Error,
    /// Worker produced partial output.
    Partial,
}

/// Validated worker output persisted into the run record.
///
/// # Invariants
/// - `summary` is at most [`MAX_SUMMARY_CHARS`] characters.
/// - `data` contains no key from [`FORBIDDEN_DATA_KEYS`] at any depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutput {
    /// Node that produced this output.
    pub node_id: NodeId,
    /// Worker type of the producing node.
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    /// Completion status.
    pub status: WorkerStatus,
    /// Structured output data (JSON object).
    pub data: Value,
    /// Human-readable summary of the work performed.
    pub summary: String,
    /// Tokens consumed by the worker.
    pub tokens_used: u64,
    /// Wall-clock execution duration in milliseconds.
    pub duration_ms: u64,
    /// Workspace-relative paths of artifacts the worker wrote.
    pub artifact_paths: Vec<String>,
}

/// Partial output returned by a worker module before the supervisor stamps
/// node identity and timing.
///
/// # Invariants
/// - `data` should be a JSON object; the supervisor rejects other shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDraft {
    /// Completion status reported by the worker.
    pub status: WorkerStatus,
    /// Structured output data (JSON object).
    pub data: Value,
    /// Human-readable summary of the work performed.
    pub summary: String,
    /// Tokens consumed by the worker.
    pub tokens_used: u64,
    /// Workspace-relative paths of artifacts the worker wrote.
    pub artifact_paths: Vec<String>,
}

impl WorkerDraft {
    /// Builds an error draft with empty data, used for timeouts and worker
    /// failures.
    #[must_use]
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Error,
            data: Value::Object(serde_json::Map::new()),
            summary: summary.into(),
            tokens_used: 0,
            artifact_paths: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn allowlist_round_trips_labels() {
        for worker_type in WORKER_TYPE_ALLOWLIST {
            assert_eq!(WorkerType::from_label(worker_type.as_str()), Some(worker_type));
        }
    }

    #[test]
    fn unknown_labels_are_rejected() {
        assert!(!WorkerType::is_allowed("shell"));
        assert!(!WorkerType::is_allowed("Gateway"));
        assert!(!WorkerType::is_allowed(""));
    }

    #[test]
    fn worker_type_deserialization_rejects_unknown() {
        let parsed: Result<WorkerType, _> = serde_json::from_str("\"rootkit\"");
        assert!(parsed.is_err());
    }
}
