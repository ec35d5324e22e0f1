// crates/pipeline-gate-core/src/core/validate.rs
// ============================================================================
// Module: Pipeline Gate Validation
// Description: Structural plan validation and worker output validation.
// Purpose: Fail closed on every invariant before state is persisted.
// Dependencies: serde_json, crate::core
// ============================================================================

//! ## Overview
//! Validation is fail-closed and exhaustive: plan validation collects every
//! violated invariant before rejecting, and worker output validation walks
//! the full output tree looking for spawn-directive keys. The forbidden-key
//! scan is purely structural; it does not interpret payload semantics.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde_json::Value;

use crate::core::error::PipelineError;
use crate::core::identifiers::NodeId;
use crate::core::plan::MAX_INSTRUCTION_CONSTRAINTS;
use crate::core::plan::MAX_PLAN_NODES;
use crate::core::plan::MIN_PLAN_NODES;
use crate::core::plan::PLAN_VERSION;
use crate::core::plan::SpawnPlan;
use crate::core::worker::FORBIDDEN_DATA_KEYS;
use crate::core::worker::MAX_DATA_DEPTH;
use crate::core::worker::MAX_SUMMARY_CHARS;
use crate::core::worker::WorkerOutput;
use crate::core::worker::WorkerType;

// ============================================================================
// SECTION: Plan Validation
// ============================================================================

/// Validates every structural invariant of a spawn plan.
///
/// All violations are collected before rejection so callers see the full
/// defect list at once.
///
/// # Errors
///
/// Returns [`PipelineError::PlanInvalid`] listing every violated invariant.
pub fn validate_plan(plan: &SpawnPlan) -> Result<(), PipelineError> {
    let mut violations = Vec::new();

    if plan.version != PLAN_VERSION {
        violations.push(format!("version must be {PLAN_VERSION}, got {}", plan.version));
    }

    let node_count = plan.nodes.len();
    if node_count < MIN_PLAN_NODES || node_count > MAX_PLAN_NODES {
        violations.push(format!(
            "node count {node_count} outside {MIN_PLAN_NODES}..={MAX_PLAN_NODES}"
        ));
    }
    if node_count > usize::try_from(plan.caps.max_workers).unwrap_or(usize::MAX) {
        violations.push(format!(
            "node count {node_count} exceeds caps.max_workers {}",
            plan.caps.max_workers
        ));
    }

    match plan.nodes.first() {
        Some(first) if first.worker_type == WorkerType::Gateway => {}
        Some(first) => {
            violations.push(format!("first node must be gateway, got {}", first.worker_type));
        }
        None => violations.push("plan has no nodes".to_string()),
    }
    match plan.nodes.last() {
        Some(last) if last.worker_type == WorkerType::Telemetry => {}
        Some(last) => {
            violations.push(format!("last node must be telemetry, got {}", last.worker_type));
        }
        None => {}
    }

    let mut node_ids: BTreeSet<&NodeId> = BTreeSet::new();
    for node in &plan.nodes {
        if !NodeId::is_valid(node.id.as_str()) {
            violations.push(format!("node id {} violates node-<lowercase-alphanum>", node.id));
        }
        if !node_ids.insert(&node.id) {
            violations.push(format!("duplicate node id {}", node.id));
        }
        if node.instruction.constraints.len() > MAX_INSTRUCTION_CONSTRAINTS {
            violations.push(format!(
                "node {} carries {} constraints (max {MAX_INSTRUCTION_CONSTRAINTS})",
                node.id,
                node.instruction.constraints.len()
            ));
        }
    }
    for node in &plan.nodes {
        for dependency in &node.depends_on {
            if !node_ids.contains(dependency) {
                violations.push(format!(
                    "node {} depends on unknown node {dependency}",
                    node.id
                ));
            }
        }
    }

    for edge in &plan.edges {
        if !node_ids.contains(&edge.from) {
            violations.push(format!("edge references unknown source node {}", edge.from));
        }
        if !node_ids.contains(&edge.to) {
            violations.push(format!("edge references unknown target node {}", edge.to));
        }
    }

    let mut gate_ids = BTreeSet::new();
    for gate in &plan.gates {
        if !node_ids.contains(&gate.after_node) {
            violations.push(format!(
                "gate {} attached after unknown node {}",
                gate.id, gate.after_node
            ));
        }
        if !gate_ids.insert(&gate.id) {
            violations.push(format!("duplicate gate id {}", gate.id));
        }
    }

    if plan.caps.max_workers == 0 {
        violations.push("caps.max_workers must be greater than zero".to_string());
    }
    if plan.caps.max_tokens == 0 {
        violations.push("caps.max_tokens must be greater than zero".to_string());
    }
    if plan.caps.max_runtime_ms == 0 {
        violations.push("caps.max_runtime_ms must be greater than zero".to_string());
    }
    if plan.caps.max_cost_cents == 0 {
        violations.push("caps.max_cost_cents must be greater than zero".to_string());
    }
    if plan.caps.max_parallel == 0 {
        violations.push("caps.max_parallel must be greater than zero".to_string());
    }
    for node in &plan.nodes {
        if node.per_worker_caps.max_tokens == 0 || node.per_worker_caps.max_runtime_ms == 0 {
            violations.push(format!("node {} has a zero per-worker cap", node.id));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::PlanInvalid {
            violations,
        })
    }
}

// ============================================================================
// SECTION: Worker Output Validation
// ============================================================================

/// Validates a worker output against the output schema and the
/// forbidden-key invariant.
///
/// # Errors
///
/// Returns [`PipelineError::SchemaViolation`] for structural defects and
/// [`PipelineError::ForbiddenKey`] when a spawn-directive key appears at any
/// depth of the output data.
pub fn validate_worker_output(
    output: &WorkerOutput,
    expected_node: &NodeId,
    expected_type: WorkerType,
) -> Result<(), PipelineError> {
    if &output.node_id != expected_node {
        return Err(PipelineError::SchemaViolation {
            path: ".node_id".to_string(),
            reason: format!("expected {expected_node}, got {}", output.node_id),
        });
    }
    if output.worker_type != expected_type {
        return Err(PipelineError::SchemaViolation {
            path: ".type".to_string(),
            reason: format!("expected {expected_type}, got {}", output.worker_type),
        });
    }
    if output.summary.chars().count() > MAX_SUMMARY_CHARS {
        return Err(PipelineError::SchemaViolation {
            path: ".summary".to_string(),
            reason: format!("summary exceeds {MAX_SUMMARY_CHARS} characters"),
        });
    }
    if !output.data.is_object() {
        return Err(PipelineError::SchemaViolation {
            path: ".data".to_string(),
            reason: "data must be a JSON object".to_string(),
        });
    }
    scan_forbidden_keys(&output.data)
}

/// Walks a JSON tree looking for forbidden spawn-directive keys.
///
/// The walk is iterative, recurses into arrays and objects, and is bounded
/// at [`MAX_DATA_DEPTH`] levels to cap cost.
///
/// # Errors
///
/// Returns [`PipelineError::ForbiddenKey`] naming the first forbidden key
/// path found, or [`PipelineError::SchemaViolation`] when the tree exceeds
/// the depth bound.
pub fn scan_forbidden_keys(data: &Value) -> Result<(), PipelineError> {
    let mut stack: Vec<(String, &Value, usize)> = vec![(String::new(), data, 0)];

    while let Some((path, value, depth)) = stack.pop() {
        if depth > MAX_DATA_DEPTH {
            return Err(PipelineError::SchemaViolation {
                path,
                reason: format!("data exceeds depth bound {MAX_DATA_DEPTH}"),
            });
        }
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = format!("{path}.{key}");
                    if FORBIDDEN_DATA_KEYS.contains(&key.as_str()) {
                        return Err(PipelineError::ForbiddenKey {
                            path: child_path,
                        });
                    }
                    stack.push((child_path, child, depth + 1));
                }
            }
            Value::Array(items) => {
                for (index, child) in items.iter().enumerate() {
                    stack.push((format!("{path}[{index}]"), child, depth + 1));
                }
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Artifact Name Safety
// ============================================================================

/// Validates an artifact filename against path-traversal shapes.
///
/// # Errors
///
/// Returns [`PipelineError::IoSafety`] when the name is empty, contains
/// `..`, starts with `/`, or contains a backslash or NUL byte.
pub fn validate_artifact_name(name: &str) -> Result<(), PipelineError> {
    let unsafe_name = name.is_empty()
        || name.contains("..")
        || name.starts_with('/')
        || name.contains('\\')
        || name.contains('\0');
    if unsafe_name {
        return Err(PipelineError::IoSafety {
            filename: name.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
