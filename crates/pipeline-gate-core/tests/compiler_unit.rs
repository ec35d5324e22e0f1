// crates/pipeline-gate-core/tests/compiler_unit.rs
// ============================================================================
// Module: Pack Compiler Unit Tests
// Description: Verifies builder topology, policy derivation, and hashing.
// ============================================================================
//! ## Overview
//! Exercises the pack compiler end to end: builder selection by domain,
//! derived PII policy, governance cap defaults, and structural hash
//! determinism across differing plan identities.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use pipeline_gate_core::CompileRequest;
use pipeline_gate_core::DocumentRef;
use pipeline_gate_core::GovernanceLevel;
use pipeline_gate_core::PipelineConfig;
use pipeline_gate_core::PipelineError;
use pipeline_gate_core::PiiPolicy;
use pipeline_gate_core::PlanId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::WorkerType;
use pipeline_gate_core::compile;
use pipeline_gate_core::hash_spawn_plan;
use pipeline_gate_core::hashing::hash_bytes;

/// Builds a fixed compile timestamp.
fn ts(raw: &str) -> Timestamp {
    Timestamp::from_rfc3339(raw).expect("timestamp")
}

/// Builds a compile request for the given domain and governance level.
fn request(domain: &str, governance_level: GovernanceLevel, constraints: &[&str]) -> CompileRequest {
    CompileRequest {
        pipeline: PipelineConfig {
            roles: vec!["analyst".to_string()],
            domain: domain.to_string(),
            governance_level,
            constraints: constraints.iter().map(ToString::to_string).collect(),
            inputs: vec!["uploaded evidence".to_string()],
            outputs: vec!["decision narrative".to_string()],
        },
        case_id: None,
        documents: vec![DocumentRef {
            doc_id: "doc-1".into(),
            filename: "evidence.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            content_hash: hash_bytes(b"evidence"),
            size_bytes: 8,
        }],
    }
}

#[test]
fn va_builder_emits_six_nodes_and_two_approval_gates() {
    let compiled = compile(
        &request("va-claims", GovernanceLevel::Strict, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");

    let types: Vec<WorkerType> =
        compiled.plan.nodes.iter().map(|node| node.worker_type).collect();
    assert_eq!(types, vec![
        WorkerType::Gateway,
        WorkerType::Extractor,
        WorkerType::Validator,
        WorkerType::Compliance,
        WorkerType::Writer,
        WorkerType::Telemetry,
    ]);

    assert_eq!(compiled.plan.gates.len(), 2);
    assert_eq!(compiled.plan.gates[0].id.as_str(), "gate-validation-review");
    assert_eq!(compiled.plan.gates[0].after_node.as_str(), "node-validator");
    assert_eq!(compiled.plan.gates[1].id.as_str(), "gate-final-approval");
    assert_eq!(compiled.plan.gates[1].after_node.as_str(), "node-writer");
    assert!(compiled.plan.gates.iter().all(|gate| gate.requires_approval));
}

#[test]
fn generic_builder_emits_four_nodes_and_one_gate() {
    let compiled = compile(
        &request("cyber-ir", GovernanceLevel::Advisory, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");

    assert_eq!(compiled.plan.nodes.len(), 4);
    assert_eq!(compiled.plan.gates.len(), 1);
    assert_eq!(compiled.plan.gates[0].id.as_str(), "gate-final-review");
}

#[test]
fn generic_gate_approval_follows_governance() {
    let advisory = compile(
        &request("cyber-ir", GovernanceLevel::Advisory, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert!(!advisory.plan.gates[0].requires_approval);

    let strict = compile(
        &request("cyber-ir", GovernanceLevel::Strict, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert!(strict.plan.gates[0].requires_approval);
}

#[test]
fn pii_policy_derivation() {
    let no_pii = compile(
        &request("cyber-ir", GovernanceLevel::Regulated, &["no-pii"]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert_eq!(no_pii.plan.pii_policy, PiiPolicy::NoRawPii);

    let regulated = compile(
        &request("cyber-ir", GovernanceLevel::Regulated, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert_eq!(regulated.plan.pii_policy, PiiPolicy::PiiEncrypted);

    let advisory = compile(
        &request("cyber-ir", GovernanceLevel::Advisory, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert_eq!(advisory.plan.pii_policy, PiiPolicy::PiiAllowed);
}

#[test]
fn caps_follow_governance_and_writer_gets_larger_budget() {
    let compiled = compile(
        &request("va-claims", GovernanceLevel::Regulated, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");

    assert_eq!(compiled.plan.caps.max_tokens, 100_000);
    assert_eq!(compiled.plan.caps.max_parallel, 1);

    let writer = compiled
        .plan
        .nodes
        .iter()
        .find(|node| node.worker_type == WorkerType::Writer)
        .expect("writer node");
    let extractor = compiled
        .plan
        .nodes
        .iter()
        .find(|node| node.worker_type == WorkerType::Extractor)
        .expect("extractor node");
    assert!(writer.per_worker_caps.max_tokens > extractor.per_worker_caps.max_tokens);
    assert!(writer.per_worker_caps.max_runtime_ms > extractor.per_worker_caps.max_runtime_ms);
}

#[test]
fn structural_hash_ignores_plan_identity() {
    let req = request("va-claims", GovernanceLevel::Strict, &["no-pii"]);
    let first = compile(&req, PlanId::generate(), ts("2026-03-01T00:00:00Z")).expect("compile");
    let second = compile(&req, PlanId::generate(), ts("2027-11-09T09:30:00Z")).expect("compile");

    assert_ne!(first.plan.plan_id, second.plan.plan_id);
    assert_ne!(first.plan.created_at, second.plan.created_at);
    assert_eq!(first.plan_hash, second.plan_hash);
    assert_eq!(first.normalized_json, second.normalized_json);
}

#[test]
fn structural_hash_ignores_collection_order() {
    let compiled = compile(
        &request("va-claims", GovernanceLevel::Strict, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");

    let mut shuffled = compiled.plan.clone();
    shuffled.nodes.reverse();
    shuffled.edges.reverse();
    shuffled.gates.reverse();
    shuffled.document_refs.reverse();

    let (original_hash, _) = hash_spawn_plan(&compiled.plan).expect("hash");
    let (shuffled_hash, _) = hash_spawn_plan(&shuffled).expect("hash");
    assert_eq!(original_hash, shuffled_hash);
}

#[test]
fn normalized_json_is_compact() {
    let compiled = compile(
        &request("cyber-ir", GovernanceLevel::Advisory, &[]),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect("compile");
    assert!(!compiled.normalized_json.contains('\n'));
    assert!(!compiled.normalized_json.contains("planId"));
    assert!(!compiled.normalized_json.contains("plan_id"));
    assert!(!compiled.normalized_json.contains("created_at"));
}

#[test]
fn constraint_overflow_is_a_plan_violation() {
    let constraints: Vec<&str> = (0..11).map(|_| "keep-logs").collect::<Vec<_>>();
    let err = compile(
        &request("cyber-ir", GovernanceLevel::Advisory, &constraints),
        PlanId::generate(),
        ts("2026-03-01T00:00:00Z"),
    )
    .expect_err("must reject");
    assert!(matches!(err, PipelineError::PlanInvalid { .. }));
}
