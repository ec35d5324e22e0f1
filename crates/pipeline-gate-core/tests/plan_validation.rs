// crates/pipeline-gate-core/tests/plan_validation.rs
// ============================================================================
// Module: Plan Validation Tests
// Description: Verifies structural plan invariants fail closed.
// ============================================================================
//! ## Overview
//! Mutates a known-good plan one invariant at a time and checks that
//! validation rejects each mutation while reporting every violation.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use pipeline_gate_core::CompileRequest;
use pipeline_gate_core::GovernanceLevel;
use pipeline_gate_core::NodeId;
use pipeline_gate_core::PipelineConfig;
use pipeline_gate_core::PipelineError;
use pipeline_gate_core::PlanId;
use pipeline_gate_core::SpawnPlan;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::compile;
use pipeline_gate_core::validate_plan;

/// Compiles a known-good VA plan to mutate in tests.
fn good_plan() -> SpawnPlan {
    compile(
        &CompileRequest {
            pipeline: PipelineConfig {
                roles: Vec::new(),
                domain: "va-claims".to_string(),
                governance_level: GovernanceLevel::Strict,
                constraints: Vec::new(),
                inputs: Vec::new(),
                outputs: Vec::new(),
            },
            case_id: None,
            documents: Vec::new(),
        },
        PlanId::generate(),
        Timestamp::from_rfc3339("2026-03-01T00:00:00Z").expect("timestamp"),
    )
    .expect("compile")
    .plan
}

/// Extracts the violation list from a `PlanInvalid` error.
fn violations(err: PipelineError) -> Vec<String> {
    match err {
        PipelineError::PlanInvalid {
            violations,
        } => violations,
        other => panic!("expected PlanInvalid, got {other}"),
    }
}

#[test]
fn good_plan_passes() {
    assert!(validate_plan(&good_plan()).is_ok());
}

#[test]
fn first_node_must_be_gateway() {
    let mut plan = good_plan();
    plan.nodes.swap(0, 1);
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("first node must be gateway")));
}

#[test]
fn last_node_must_be_telemetry() {
    let mut plan = good_plan();
    let last = plan.nodes.len() - 1;
    plan.nodes.swap(last - 1, last);
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("last node must be telemetry")));
}

#[test]
fn node_count_bounded_by_caps() {
    let mut plan = good_plan();
    plan.caps.max_workers = 2;
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("exceeds caps.max_workers")));
}

#[test]
fn edge_endpoints_must_resolve() {
    let mut plan = good_plan();
    plan.edges[0].to = NodeId::parse("node-ghost").expect("node id");
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("unknown target node")));
}

#[test]
fn gate_after_node_must_resolve() {
    let mut plan = good_plan();
    plan.gates[0].after_node = NodeId::parse("node-ghost").expect("node id");
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("unknown node")));
}

#[test]
fn dependencies_must_resolve() {
    let mut plan = good_plan();
    plan.nodes[1].depends_on.push(NodeId::parse("node-ghost").expect("node id"));
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("depends on unknown node")));
}

#[test]
fn multiple_violations_are_all_reported() {
    let mut plan = good_plan();
    plan.nodes.swap(0, 1);
    plan.caps.max_workers = 2;
    plan.edges[0].to = NodeId::parse("node-ghost").expect("node id");
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.len() >= 3, "got: {list:?}");
}

#[test]
fn zero_caps_are_rejected() {
    let mut plan = good_plan();
    plan.caps.max_tokens = 0;
    plan.caps.max_parallel = 0;
    let list = violations(validate_plan(&plan).unwrap_err());
    assert!(list.iter().any(|violation| violation.contains("max_tokens")));
    assert!(list.iter().any(|violation| violation.contains("max_parallel")));
}
