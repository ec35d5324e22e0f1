// crates/pipeline-gate-workers/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Workers Library
// Description: Built-in worker modules and the read-only worker registry.
// Purpose: Provide the spawnable worker implementations behind a closed table.
// Dependencies: pipeline-gate-core, async-trait, regex, serde_json, tracing
// ============================================================================

//! ## Overview
//! Six built-in worker modules implement the spawnable pipeline stages:
//! gateway, extractor, validator, compliance, writer, and telemetry. The
//! [`WorkerRegistry`] is a compile-time constant table; modules cannot
//! register themselves, cannot mutate the table, and cannot obtain a
//! reference to the supervisor. Workers reach the outside world only through
//! the scoped context they are handed at spawn time.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod registry;
pub mod workers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use registry::WorkerRegistry;
pub use workers::compliance::ComplianceWorker;
pub use workers::extractor::ExtractorWorker;
pub use workers::gateway::GatewayWorker;
pub use workers::telemetry::TelemetryWorker;
pub use workers::validator::ValidatorWorker;
pub use workers::writer::WriterWorker;
