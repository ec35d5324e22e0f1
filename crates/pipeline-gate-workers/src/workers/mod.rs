// crates/pipeline-gate-workers/src/workers/mod.rs
// ============================================================================
// Module: Built-in Workers
// Description: The six spawnable pipeline stage implementations.
// Purpose: Group worker modules behind one module path.
// Dependencies: crate-internal
// ============================================================================

//! ## Overview
//! Each worker is a pure async module: it consumes an instruction, an
//! assembled input, and a scoped context, and returns a draft output for the
//! supervisor to validate. Gateway, compliance, and telemetry are
//! computational; extractor, validator, and writer call the model proxy.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod compliance;
pub mod extractor;
pub mod gateway;
pub mod telemetry;
pub mod validator;
pub mod writer;
