// crates/pipeline-gate-supervisor/src/bundle.rs
// ============================================================================
// Module: Evidence Assembly
// Description: Builds, rebuilds, and persists run evidence bundles.
// Purpose: Keep artifact identity deterministic across pause and resume.
// Dependencies: pipeline-gate-core, serde_json, tokio
// ============================================================================

//! ## Overview
//! Artifact identifiers are derived from node order (`art-0000-plan`,
//! `art-0001-worker-…`), so a bundle rebuilt from the persisted run record
//! after a gate pause carries the same identifiers and content hashes as one
//! accumulated in a single uninterrupted execution. Zero-padded sequence
//! numbers make lexicographic seal order equal insertion order. The sealed
//! bundle persists as a JSON file inside the run's workspace directory.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use pipeline_gate_core::ArtifactId;
use pipeline_gate_core::ArtifactKind;
use pipeline_gate_core::BundleError;
use pipeline_gate_core::BundleId;
use pipeline_gate_core::EvidenceArtifact;
use pipeline_gate_core::EvidenceBundle;
use pipeline_gate_core::HashError;
use pipeline_gate_core::NodeId;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::RunId;
use pipeline_gate_core::SpawnPlan;
use pipeline_gate_core::Timestamp;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Filename of the persisted sealed bundle inside the run directory.
pub const BUNDLE_FILENAME: &str = "evidence_bundle.json";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bundle persistence errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BundleFileError {
    /// Filesystem failure while persisting or loading.
    #[error("bundle file io error: {0}")]
    Io(String),
    /// Bundle JSON failed to encode or decode.
    #[error("bundle encoding error: {0}")]
    Encode(String),
}

// ============================================================================
// SECTION: Artifact Identity
// ============================================================================

/// Returns the deterministic bundle identifier for a run.
#[must_use]
pub fn bundle_id_for(run_id: &RunId) -> BundleId {
    BundleId::new(format!("bundle-{run_id}"))
}

/// Builds the plan artifact (`art-0000-plan`).
///
/// # Errors
///
/// Returns [`HashError`] when the plan cannot be canonicalized.
pub fn plan_artifact(
    plan: &SpawnPlan,
    captured_at: Timestamp,
) -> Result<EvidenceArtifact, HashError> {
    EvidenceArtifact::from_payload(
        ArtifactId::new("art-0000-plan"),
        ArtifactKind::Plan,
        "spawn_plan.json",
        plan,
        captured_at,
        "Executed spawn plan",
        None,
    )
}

/// Builds the worker output artifact for the node at `index`.
///
/// # Errors
///
/// Returns [`HashError`] when the output data cannot be canonicalized.
pub fn worker_artifact(
    index: usize,
    node_id: &NodeId,
    data: &Value,
    captured_at: Timestamp,
) -> Result<EvidenceArtifact, HashError> {
    EvidenceArtifact::from_payload(
        ArtifactId::new(format!("art-{:04}-worker-{node_id}", index + 1)),
        ArtifactKind::WorkerOutput,
        format!("{node_id}_output.json"),
        data,
        captured_at,
        format!("Validated output of {node_id}"),
        Some(node_id.clone()),
    )
}

// ============================================================================
// SECTION: Bundle Construction
// ============================================================================

/// Creates the collecting bundle for a fresh execution, seeded with the plan
/// artifact.
///
/// # Errors
///
/// Returns [`BundleError`] when the plan artifact cannot be built.
pub fn new_bundle(run: &PipelineRun, started_at: Timestamp) -> Result<EvidenceBundle, BundleError> {
    let mut bundle = EvidenceBundle::new(
        bundle_id_for(&run.id),
        run.id.clone(),
        run.spawn_plan_hash.clone(),
        started_at,
    );
    bundle.append_artifact(plan_artifact(&run.spawn_plan, started_at)?)?;
    Ok(bundle)
}

/// Rebuilds the collecting bundle from a persisted run record.
///
/// Artifacts are regenerated in plan node order from the persisted worker
/// results, reproducing the identifiers and content hashes an uninterrupted
/// execution would have accumulated.
///
/// # Errors
///
/// Returns [`BundleError`] when any artifact cannot be built.
pub fn rebuild_bundle(run: &PipelineRun) -> Result<EvidenceBundle, BundleError> {
    let started_at = run.started_at.unwrap_or(run.created_at);
    let mut bundle = new_bundle(run, started_at)?;
    for (index, node) in run.spawn_plan.nodes.iter().enumerate() {
        if let Some(output) = run.worker_results.get(&node.id) {
            bundle.append_artifact(worker_artifact(
                index,
                &node.id,
                &output.data,
                run.updated_at,
            )?)?;
        }
    }
    Ok(bundle)
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

/// Returns the bundle file path for a run.
#[must_use]
pub fn bundle_path(workspace: &Path, run_id: &RunId) -> PathBuf {
    workspace.join("run").join(run_id.as_str()).join(BUNDLE_FILENAME)
}

/// Persists a bundle as JSON inside the run directory.
///
/// # Errors
///
/// Returns [`BundleFileError`] when encoding or writing fails.
pub async fn persist_bundle(
    workspace: &Path,
    bundle: &EvidenceBundle,
) -> Result<(), BundleFileError> {
    let path = bundle_path(workspace, &bundle.run_id);
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_else(|| workspace.to_path_buf());
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|err| BundleFileError::Io(err.to_string()))?;
    let encoded = serde_json::to_vec_pretty(bundle)
        .map_err(|err| BundleFileError::Encode(err.to_string()))?;
    tokio::fs::write(&path, encoded)
        .await
        .map_err(|err| BundleFileError::Io(err.to_string()))?;
    Ok(())
}

/// Loads a persisted bundle, if one exists.
///
/// # Errors
///
/// Returns [`BundleFileError`] when reading or decoding fails.
pub async fn load_bundle(
    workspace: &Path,
    run_id: &RunId,
) -> Result<Option<EvidenceBundle>, BundleFileError> {
    let path = bundle_path(workspace, run_id);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(BundleFileError::Io(err.to_string())),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| BundleFileError::Encode(err.to_string()))
}
