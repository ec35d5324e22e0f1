// crates/pipeline-gate-core/src/lib.rs
// ============================================================================
// Module: Pipeline Gate Core Library
// Description: Data model, validation, hashing, compiler, and interfaces.
// Purpose: Provide the canonical types and contracts for the execution core.
// Dependencies: async-trait, serde, serde_jcs, serde_json, sha2, thiserror, time, uuid
// ============================================================================

//! ## Overview
//! Pipeline Gate Core defines the spawn plan data model, the closed worker
//! allowlist, run records, the tamper-evident evidence bundle, canonical
//! hashing, the pack compiler, and the capability interfaces the execution
//! engine consumes. The crate is deliberately free of I/O: persistence,
//! model vendors, and the filesystem sit behind the interfaces defined here.
//!
//! Invariants:
//! - Every hash is SHA-256 over RFC 8785 canonical JSON.
//! - The worker allowlist is a closed enumeration.
//! - Sealed evidence bundles reject all mutation.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::error::CapDimension;
pub use crate::core::error::PipelineError;
pub use crate::core::evidence::ArtifactKind;
pub use crate::core::evidence::BundleError;
pub use crate::core::evidence::BundleStatus;
pub use crate::core::evidence::EvidenceArtifact;
pub use crate::core::evidence::EvidenceBundle;
pub use crate::core::evidence::GateRecord;
pub use crate::core::evidence::SealChecks;
pub use crate::core::evidence::SealVerification;
pub use crate::core::hashing;
pub use crate::core::hashing::HashDigest;
pub use crate::core::hashing::HashError;
pub use crate::core::identifiers::ArtifactId;
pub use crate::core::identifiers::BundleId;
pub use crate::core::identifiers::CaseId;
pub use crate::core::identifiers::DocId;
pub use crate::core::identifiers::GateId;
pub use crate::core::identifiers::NodeId;
pub use crate::core::identifiers::PlanId;
pub use crate::core::identifiers::RunId;
pub use crate::core::identifiers::TenantId;
pub use crate::core::plan::AuthorityLevel;
pub use crate::core::plan::DocumentRef;
pub use crate::core::plan::GateSpec;
pub use crate::core::plan::GovernanceLevel;
pub use crate::core::plan::PLAN_VERSION;
pub use crate::core::plan::PerWorkerCaps;
pub use crate::core::plan::PiiPolicy;
pub use crate::core::plan::PlanEdge;
pub use crate::core::plan::RunCaps;
pub use crate::core::plan::SpawnNode;
pub use crate::core::plan::SpawnPlan;
pub use crate::core::plan::WorkerInstruction;
pub use crate::core::plan::hash_spawn_plan;
pub use crate::core::run::CapsUsed;
pub use crate::core::run::GateResolution;
pub use crate::core::run::GateState;
pub use crate::core::run::PipelineRun;
pub use crate::core::run::RunStatus;
pub use crate::core::time::TimeError;
pub use crate::core::time::Timestamp;
pub use crate::core::validate::scan_forbidden_keys;
pub use crate::core::validate::validate_artifact_name;
pub use crate::core::validate::validate_plan;
pub use crate::core::validate::validate_worker_output;
pub use crate::core::worker::FORBIDDEN_DATA_KEYS;
pub use crate::core::worker::MAX_DATA_DEPTH;
pub use crate::core::worker::MAX_SUMMARY_CHARS;
pub use crate::core::worker::WORKER_TYPE_ALLOWLIST;
pub use crate::core::worker::WorkerDraft;
pub use crate::core::worker::WorkerOutput;
pub use crate::core::worker::WorkerStatus;
pub use crate::core::worker::WorkerType;
pub use crate::interfaces::Clock;
pub use crate::interfaces::DocStore;
pub use crate::interfaces::DocStoreError;
pub use crate::interfaces::DocumentRecord;
pub use crate::interfaces::GateTransition;
pub use crate::interfaces::ModelCallMetadata;
pub use crate::interfaces::ModelError;
pub use crate::interfaces::ModelProxy;
pub use crate::interfaces::ModelReply;
pub use crate::interfaces::ModelRequest;
pub use crate::interfaces::PolicyView;
pub use crate::interfaces::RunFilter;
pub use crate::interfaces::RunPage;
pub use crate::interfaces::RunStore;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::StoredDocument;
pub use crate::interfaces::TokenUsage;
pub use crate::interfaces::WorkerContext;
pub use crate::interfaces::WorkerInput;
pub use crate::interfaces::WorkerInvokeError;
pub use crate::interfaces::WorkerModule;
pub use crate::runtime::compiler::CompileRequest;
pub use crate::runtime::compiler::CompiledPlan;
pub use crate::runtime::compiler::PipelineConfig;
pub use crate::runtime::compiler::compile;
pub use crate::runtime::compiler::derive_pii_policy;
