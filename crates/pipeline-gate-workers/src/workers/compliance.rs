// crates/pipeline-gate-workers/src/workers/compliance.rs
// ============================================================================
// Module: Compliance Worker
// Description: Scans upstream outputs for PII and regulatory eligibility.
// Purpose: Enforce the run's PII policy at worker runtime.
// Dependencies: pipeline-gate-core, regex, serde_json
// ============================================================================

//! ## Overview
//! The compliance worker is computational: it serializes the upstream
//! outputs it received and scans the text for PII-shaped patterns (SSNs,
//! email addresses, phone-shaped digit runs). Findings carry kinds and
//! counts only, never the matched text, so the report itself cannot leak
//! PII. Under `NO_RAW_PII`, any finding annotates the output with a
//! redaction requirement.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::LazyLock;

use async_trait::async_trait;
use pipeline_gate_core::PiiPolicy;
use pipeline_gate_core::WorkerDraft;
use pipeline_gate_core::WorkerInstruction;
use pipeline_gate_core::WorkerModule;
use pipeline_gate_core::WorkerStatus;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::interfaces::WorkerContext;
use pipeline_gate_core::interfaces::WorkerInput;
use pipeline_gate_core::interfaces::WorkerInvokeError;
use regex::Regex;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Compliance report artifact filename.
const REPORT_FILENAME: &str = "compliance_report.json";

/// Output annotation requiring redaction before disclosure.
pub const ACTION_REDACTION_REQUIRED: &str = "REDACTION_REQUIRED";

/// SSN-shaped pattern (`###-##-####`).
static SSN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| scanner_pattern(r"\b\d{3}-\d{2}-\d{4}\b"));

/// Email-shaped pattern.
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| scanner_pattern(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"));

/// Phone-shaped pattern (ten digits with common separators).
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| scanner_pattern(r"\b\d{3}[-. ]\d{3}[-. ]\d{4}\b"));

/// Compiles a built-in scanner pattern.
#[allow(
    clippy::expect_used,
    reason = "Built-in patterns are compile-time literals covered by tests."
)]
fn scanner_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in scanner pattern")
}

// ============================================================================
// SECTION: Compliance Worker
// ============================================================================

/// Computational worker that scans for PII and eligibility issues.
#[derive(Debug, Clone, Copy)]
pub struct ComplianceWorker;

#[async_trait]
impl WorkerModule for ComplianceWorker {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Compliance
    }

    async fn execute(
        &self,
        _instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError> {
        let scanned_text = serde_json::to_string(&input.data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;

        let mut findings = Vec::new();
        for (kind, pattern) in [
            ("ssn", &*SSN_PATTERN),
            ("email", &*EMAIL_PATTERN),
            ("phone", &*PHONE_PATTERN),
        ] {
            let count = pattern.find_iter(&scanned_text).count();
            if count > 0 {
                findings.push(json!({ "kind": kind, "count": count }));
            }
        }

        let policy = ctx.policy();
        let redaction_required =
            policy.pii_policy == PiiPolicy::NoRawPii && !findings.is_empty();

        let mut data = json!({
            "pii_findings": findings,
            "pii_policy": policy.pii_policy,
            "eligible": true,
            "governance_level": policy.governance_level,
        });
        if redaction_required {
            data["pii_policy_action"] = json!(ACTION_REDACTION_REQUIRED);
        }

        let artifact = serde_json::to_vec(&data)
            .map_err(|err| WorkerInvokeError::Artifact(err.to_string()))?;
        let artifact_path = ctx.write_artifact(REPORT_FILENAME, &artifact).await?;

        let finding_count = data["pii_findings"].as_array().map_or(0, Vec::len);
        Ok(WorkerDraft {
            status: WorkerStatus::Success,
            data,
            summary: if redaction_required {
                format!("{finding_count} PII finding kind(s); redaction required")
            } else {
                format!("{finding_count} PII finding kind(s)")
            },
            tokens_used: 0,
            artifact_paths: vec![artifact_path],
        })
    }
}
