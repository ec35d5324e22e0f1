// crates/pipeline-gate-core/src/core/evidence.rs
// ============================================================================
// Module: Pipeline Gate Evidence Bundle
// Description: Tamper-evident evidence bundle with manifest and seal hashes.
// Purpose: Chain plan, artifacts, gate decisions, and timing into one seal.
// Dependencies: serde, crate::core::{hashing, identifiers, time}
// ============================================================================

//! ## Overview
//! The evidence bundle accumulates artifact records during a run and is
//! sealed exactly once at completion. The seal chains the bundle identity,
//! run, plan hash, artifact manifest, and seal time into a single hash; any
//! later mutation of any chained field makes independent re-verification
//! fail. Artifact records carry content hashes only; payload bytes live in
//! the run workspace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::hashing::HashError;
use crate::core::hashing::hash_canonical_json;
use crate::core::hashing::hash_text;
use crate::core::identifiers::ArtifactId;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::GateId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::time::TimeError;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Evidence bundle mutation and sealing errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum BundleError {
    /// Bundle is sealed; all mutation is rejected.
    #[error("evidence bundle is sealed")]
    Sealed,
    /// Artifact identifier already exists in the bundle.
    #[error("duplicate artifact id: {0}")]
    DuplicateArtifact(String),
    /// Payload canonicalization failed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Timestamp formatting failed.
    #[error(transparent)]
    Time(#[from] TimeError),
}

// ============================================================================
// SECTION: Artifact Records
// ============================================================================

/// Evidence artifact classification.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Validated worker output data.
    #[serde(rename = "WORKER_OUTPUT")]
    WorkerOutput,
    /// Gate resolution records.
    #[serde(rename = "GATE_RECORD")]
    GateRecord,
    /// The executed spawn plan.
    #[serde(rename = "PLAN")]
    Plan,
    /// Run-level execution metadata.
    #[serde(rename = "METADATA")]
    Metadata,
    /// Policy compliance findings.
    #[serde(rename = "POLICY_COMPLIANCE")]
    PolicyCompliance,
}

/// One artifact record inside an evidence bundle.
///
/// # Invariants
/// - `content_hash` is SHA-256 over the canonical JSON of the payload.
/// - `artifact_id` is unique within the owning bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    /// Artifact identifier (lexicographic order is the seal order).
    pub artifact_id: ArtifactId,
    /// Artifact classification.
    pub artifact_type: ArtifactKind,
    /// Filename of the artifact payload in the run workspace.
    pub filename: String,
    /// SHA-256 of the canonical JSON payload.
    pub content_hash: HashDigest,
    /// Capture timestamp.
    pub captured_at: Timestamp,
    /// Human-readable description.
    pub description: String,
    /// Node that produced the payload, when applicable.
    pub source_node: Option<NodeId>,
}

impl EvidenceArtifact {
    /// Builds an artifact record, hashing the payload's canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the payload cannot be canonicalized.
    pub fn from_payload<T: Serialize>(
        artifact_id: ArtifactId,
        artifact_type: ArtifactKind,
        filename: impl Into<String>,
        payload: &T,
        captured_at: Timestamp,
        description: impl Into<String>,
        source_node: Option<NodeId>,
    ) -> Result<Self, HashError> {
        Ok(Self {
            artifact_id,
            artifact_type,
            filename: filename.into(),
            content_hash: hash_canonical_json(payload)?,
            captured_at,
            description: description.into(),
            source_node,
        })
    }
}

/// Gate decision captured in the bundle at completion.
///
/// # Invariants
/// - Mirrors the run record's resolutions in resolution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRecord {
    /// Resolved gate.
    pub gate_id: GateId,
    /// Whether the gate was approved.
    pub approved: bool,
    /// Identity of the resolver.
    pub resolved_by: String,
    /// Resolution timestamp.
    pub resolved_at: Timestamp,
    /// Optional rationale supplied by the resolver.
    pub rationale: Option<String>,
}

// ============================================================================
// SECTION: Bundle Status
// ============================================================================

/// Evidence bundle lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and contract matching.
/// - `SEALED` is terminal; no mutation is permitted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleStatus {
    /// Bundle is accumulating artifacts.
    #[serde(rename = "COLLECTING")]
    Collecting,
    /// Execution finished; bundle awaits sealing.
    #[serde(rename = "COMPLETE")]
    Complete,
    /// Bundle is sealed and immutable.
    #[serde(rename = "SEALED")]
    Sealed,
}

// ============================================================================
// SECTION: Evidence Bundle
// ============================================================================

/// Tamper-evident record of a run: plan, artifacts, gates, and timing.
///
/// # Invariants
/// - Artifact identifiers are unique.
/// - Once sealed, every field is frozen and mutation APIs reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    /// Bundle identifier.
    pub bundle_id: BundleId,
    /// Run the bundle evidences.
    pub run_id: RunId,
    /// Structural hash of the executed plan.
    pub plan_hash: HashDigest,
    /// Execution start timestamp.
    pub started_at: Timestamp,
    /// Execution completion timestamp.
    pub completed_at: Option<Timestamp>,
    /// Seal timestamp; required for independent re-verification.
    pub sealed_at: Option<Timestamp>,
    /// Lifecycle status.
    pub status: BundleStatus,
    /// Artifact records in insertion order.
    pub artifacts: Vec<EvidenceArtifact>,
    /// Gate decisions in resolution order.
    pub gate_records: Vec<GateRecord>,
    /// Hash over the sorted artifact manifest.
    pub manifest_hash: Option<HashDigest>,
    /// Hash chaining identity, plan, manifest, and seal time.
    pub seal_hash: Option<HashDigest>,
    /// Human-readable run summary.
    pub summary: String,
}

impl EvidenceBundle {
    /// Creates an empty collecting bundle.
    #[must_use]
    pub fn new(
        bundle_id: BundleId,
        run_id: RunId,
        plan_hash: HashDigest,
        started_at: Timestamp,
    ) -> Self {
        Self {
            bundle_id,
            run_id,
            plan_hash,
            started_at,
            completed_at: None,
            sealed_at: None,
            status: BundleStatus::Collecting,
            artifacts: Vec::new(),
            gate_records: Vec::new(),
            manifest_hash: None,
            seal_hash: None,
            summary: String::new(),
        }
    }

    /// Appends an artifact record.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Sealed`] after sealing and
    /// [`BundleError::DuplicateArtifact`] for a reused identifier.
    pub fn append_artifact(&mut self, artifact: EvidenceArtifact) -> Result<(), BundleError> {
        if self.status == BundleStatus::Sealed {
            return Err(BundleError::Sealed);
        }
        if self.artifacts.iter().any(|existing| existing.artifact_id == artifact.artifact_id) {
            return Err(BundleError::DuplicateArtifact(artifact.artifact_id.as_str().to_string()));
        }
        self.artifacts.push(artifact);
        Ok(())
    }

    /// Appends a gate decision record.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Sealed`] after sealing.
    pub fn record_gate(&mut self, record: GateRecord) -> Result<(), BundleError> {
        if self.status == BundleStatus::Sealed {
            return Err(BundleError::Sealed);
        }
        self.gate_records.push(record);
        Ok(())
    }

    /// Sets the human-readable run summary.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Sealed`] after sealing.
    pub fn set_summary(&mut self, summary: impl Into<String>) -> Result<(), BundleError> {
        if self.status == BundleStatus::Sealed {
            return Err(BundleError::Sealed);
        }
        self.summary = summary.into();
        Ok(())
    }

    /// Marks collection finished ahead of sealing.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Sealed`] after sealing.
    pub fn mark_complete(&mut self, completed_at: Timestamp) -> Result<(), BundleError> {
        if self.status == BundleStatus::Sealed {
            return Err(BundleError::Sealed);
        }
        self.completed_at = Some(completed_at);
        self.status = BundleStatus::Complete;
        Ok(())
    }

    /// Seals the bundle.
    ///
    /// The seal protocol is bit-stable: artifacts sorted by identifier, the
    /// manifest joined as `<id>:<hash>` entries with `|`, then the seal
    /// preimage `[bundle_id, run_id, plan_hash, manifest_hash, sealed_at]`
    /// joined with `|`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Sealed`] when already sealed, or
    /// [`BundleError::Time`] when the seal timestamp cannot be formatted.
    pub fn seal(&mut self, sealed_at: Timestamp) -> Result<(), BundleError> {
        if self.status == BundleStatus::Sealed {
            return Err(BundleError::Sealed);
        }
        let manifest_hash = hash_text(&self.manifest_string());
        let sealed_at_text = sealed_at.to_rfc3339()?;
        let seal_hash = hash_text(&seal_preimage(
            &self.bundle_id,
            &self.run_id,
            &self.plan_hash,
            &manifest_hash,
            &sealed_at_text,
        ));
        self.sealed_at = Some(sealed_at);
        self.manifest_hash = Some(manifest_hash);
        self.seal_hash = Some(seal_hash);
        self.status = BundleStatus::Sealed;
        Ok(())
    }

    /// Builds the `|`-joined manifest string over artifacts sorted by
    /// identifier.
    #[must_use]
    fn manifest_string(&self) -> String {
        let mut entries: Vec<&EvidenceArtifact> = self.artifacts.iter().collect();
        entries.sort_by(|a, b| a.artifact_id.cmp(&b.artifact_id));
        let parts: Vec<String> = entries
            .iter()
            .map(|artifact| format!("{}:{}", artifact.artifact_id, artifact.content_hash))
            .collect();
        parts.join("|")
    }

    /// Re-verifies the seal from stored fields alone.
    ///
    /// Recomputes the manifest hash from the stored artifacts and the seal
    /// hash from the stored identity fields, comparing both against the
    /// stored values.
    #[must_use]
    pub fn verify(&self) -> SealVerification {
        let is_sealed = self.status == BundleStatus::Sealed;
        if !is_sealed {
            return SealVerification::invalid("Bundle is not sealed", SealChecks {
                is_sealed: false,
                has_required_fields: false,
                manifest_integrity: false,
                seal_integrity: false,
            });
        }

        let (Some(stored_manifest), Some(stored_seal), Some(sealed_at)) =
            (&self.manifest_hash, &self.seal_hash, self.sealed_at)
        else {
            return SealVerification::invalid("Missing required seal fields", SealChecks {
                is_sealed: true,
                has_required_fields: false,
                manifest_integrity: false,
                seal_integrity: false,
            });
        };

        let manifest_integrity = hash_text(&self.manifest_string()) == *stored_manifest;
        if !manifest_integrity {
            return SealVerification::invalid("Manifest hash mismatch", SealChecks {
                is_sealed: true,
                has_required_fields: true,
                manifest_integrity: false,
                seal_integrity: false,
            });
        }

        let seal_integrity = sealed_at.to_rfc3339().map_or(false, |sealed_at_text| {
            hash_text(&seal_preimage(
                &self.bundle_id,
                &self.run_id,
                &self.plan_hash,
                stored_manifest,
                &sealed_at_text,
            )) == *stored_seal
        });
        if !seal_integrity {
            return SealVerification::invalid("Seal hash mismatch", SealChecks {
                is_sealed: true,
                has_required_fields: true,
                manifest_integrity: true,
                seal_integrity: false,
            });
        }

        SealVerification {
            valid: true,
            reason: None,
            checks: SealChecks {
                is_sealed: true,
                has_required_fields: true,
                manifest_integrity: true,
                seal_integrity: true,
            },
        }
    }
}

/// Builds the `|`-joined seal preimage string.
fn seal_preimage(
    bundle_id: &BundleId,
    run_id: &RunId,
    plan_hash: &HashDigest,
    manifest_hash: &HashDigest,
    sealed_at_text: &str,
) -> String {
    format!("{bundle_id}|{run_id}|{plan_hash}|{manifest_hash}|{sealed_at_text}")
}

// ============================================================================
// SECTION: Verification Report
// ============================================================================

/// Individual checks performed by seal verification.
///
/// # Invariants
/// - Checks are ordered; a failed check leaves later checks `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealChecks {
    /// Bundle status is `SEALED`.
    pub is_sealed: bool,
    /// Seal fields (`manifest_hash`, `seal_hash`, `sealed_at`) are present.
    pub has_required_fields: bool,
    /// Recomputed manifest hash matches the stored value.
    pub manifest_integrity: bool,
    /// Recomputed seal hash matches the stored value.
    pub seal_integrity: bool,
}

/// Auditor-facing result of seal verification.
///
/// # Invariants
/// - `reason` is present exactly when `valid` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealVerification {
    /// Overall verification outcome.
    pub valid: bool,
    /// Failure reason when invalid.
    pub reason: Option<String>,
    /// Individual check outcomes.
    pub checks: SealChecks,
}

impl SealVerification {
    /// Builds a failed verification with the given reason.
    fn invalid(reason: &str, checks: SealChecks) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            checks,
        }
    }
}
