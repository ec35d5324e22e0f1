// crates/pipeline-gate-workers/src/registry.rs
// ============================================================================
// Module: Worker Registry
// Description: Read-only table mapping worker types to built-in modules.
// Purpose: Keep the allowlist closed and the module table immutable.
// Dependencies: pipeline-gate-core, crate::workers
// ============================================================================

//! ## Overview
//! The registry is a process-wide constant: a match over the closed worker
//! type enumeration returning static module instances. There is no
//! registration API, so the set of spawnable modules is fixed at compile
//! time. Allowlisted types without a built-in module resolve to `None` and
//! fail the spawning run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerType;

use crate::workers::compliance::ComplianceWorker;
use crate::workers::extractor::ExtractorWorker;
use crate::workers::gateway::GatewayWorker;
use crate::workers::telemetry::TelemetryWorker;
use crate::workers::validator::ValidatorWorker;
use crate::workers::writer::WriterWorker;

// ============================================================================
// SECTION: Static Modules
// ============================================================================

/// Gateway module instance.
static GATEWAY: GatewayWorker = GatewayWorker;
/// Extractor module instance.
static EXTRACTOR: ExtractorWorker = ExtractorWorker;
/// Validator module instance.
static VALIDATOR: ValidatorWorker = ValidatorWorker;
/// Compliance module instance.
static COMPLIANCE: ComplianceWorker = ComplianceWorker;
/// Writer module instance.
static WRITER: WriterWorker = WriterWorker;
/// Telemetry module instance.
static TELEMETRY: TelemetryWorker = TelemetryWorker;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Read-only lookup table for built-in worker modules.
///
/// # Invariants
/// - The table is a compile-time constant; no mutation API exists.
#[derive(Debug, Clone, Copy)]
pub struct WorkerRegistry;

impl WorkerRegistry {
    /// Returns the built-in module for a worker type, when one exists.
    #[must_use]
    pub fn get(worker_type: WorkerType) -> Option<&'static dyn WorkerModule> {
        match worker_type {
            WorkerType::Gateway => Some(&GATEWAY),
            WorkerType::Extractor => Some(&EXTRACTOR),
            WorkerType::Validator => Some(&VALIDATOR),
            WorkerType::Compliance => Some(&COMPLIANCE),
            WorkerType::Writer => Some(&WRITER),
            WorkerType::Telemetry => Some(&TELEMETRY),
            WorkerType::Intake
            | WorkerType::Analyzer
            | WorkerType::Scorer
            | WorkerType::Builder
            | WorkerType::Qa
            | WorkerType::Supervisor => None,
        }
    }

    /// Reports whether a wire label names an allowlisted worker type.
    #[must_use]
    pub fn is_allowed(label: &str) -> bool {
        WorkerType::is_allowed(label)
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
    fn built_in_types_resolve() {
        for worker_type in [
            WorkerType::Gateway,
            WorkerType::Extractor,
            WorkerType::Validator,
            WorkerType::Compliance,
            WorkerType::Writer,
            WorkerType::Telemetry,
        ] {
            let module = WorkerRegistry::get(worker_type).expect("module");
            assert_eq!(module.worker_type(), worker_type);
        }
    }

    #[test]
    fn types_without_modules_resolve_to_none() {
        for worker_type in [
            WorkerType::Intake,
            WorkerType::Analyzer,
            WorkerType::Scorer,
            WorkerType::Builder,
            WorkerType::Qa,
            WorkerType::Supervisor,
        ] {
            assert!(WorkerRegistry::get(worker_type).is_none());
        }
    }

    #[test]
    fn allowlist_lookup_matches_type_enum() {
        assert!(WorkerRegistry::is_allowed("gateway"));
        assert!(!WorkerRegistry::is_allowed("shell"));
    }
}
