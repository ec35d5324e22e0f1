// crates/pipeline-gate-server/src/routes.rs
// ============================================================================
// Module: Pipeline Routes
// Description: Tenant-authenticated HTTP surface for the execution core.
// Purpose: Map upload, compile, execute, gate, and evidence onto the engine.
// Dependencies: axum, pipeline-gate-core, pipeline-gate-supervisor
// ============================================================================

//! ## Overview
//! Every route is tenant-scoped through the `x-tenant-id` header; a missing
//! header is 400 and an unusable one 403. Execution routes answer 503 while
//! no model proxy is wired. Responses are JSON with snake_case field names,
//! matching the engine's wire forms.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::request::Parts;
use axum::routing::get;
use axum::routing::post;
use pipeline_gate_core::CaseId;
use pipeline_gate_core::GateResolution;
use pipeline_gate_core::GateTransition;
use pipeline_gate_core::PipelineConfig;
use pipeline_gate_core::PipelineError;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::PlanId;
use pipeline_gate_core::RunFilter;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunStatus;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::TenantId;
use pipeline_gate_supervisor::ExecutionResult;
use pipeline_gate_supervisor::ExecutionStatus;
use pipeline_gate_supervisor::bundle::load_bundle;
use pipeline_gate_supervisor::resume_after_gate;
use pipeline_gate_supervisor::start_execution;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tracing::info;

use crate::config::ALLOWED_MIME_TYPES;
use crate::config::MAX_UPLOAD_BYTES;
use crate::config::MAX_UPLOAD_FILES;
use crate::error::ServerError;
use crate::state::AppState;

// ============================================================================
// SECTION: Tenant Extraction
// ============================================================================

/// Header carrying the authenticated tenant identity.
const TENANT_HEADER: &str = "x-tenant-id";

/// Authenticated tenant extracted from request headers.
///
/// # Invariants
/// - Authentication itself happens upstream; this boundary only consumes the
///   already-established identity header.
pub struct Tenant(pub TenantId);

impl<S> axum::extract::FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(TENANT_HEADER) else {
            return Err(ServerError::BadRequest(format!("missing {TENANT_HEADER} header")));
        };
        let raw = raw.to_str().map_err(|_| ServerError::NotTenant)?;
        TenantId::parse(raw).map(Tenant).ok_or(ServerError::NotTenant)
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the pipeline router over the shared state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pipeline/upload", post(upload_documents))
        .route("/pipeline/compile", post(compile_pipeline))
        .route("/pipeline/execute", post(execute_run))
        .route("/pipeline/runs", get(list_runs))
        .route("/pipeline/{id}/status", get(run_status))
        .route("/pipeline/{id}/gate/{gate_id}/resolve", post(resolve_run_gate))
        .route("/pipeline/{id}/evidence", get(run_evidence))
        .route("/pipeline/{id}/evidence/verify", get(verify_run_evidence))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_FILES * MAX_UPLOAD_BYTES + 1024 * 1024))
        .with_state(state)
}

// ============================================================================
// SECTION: Health
// ============================================================================

/// Liveness/readiness probe over the store.
async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    state.store.readiness().map_err(ServerError::from)?;
    Ok(Json(json!({ "status": "ok" })))
}

// ============================================================================
// SECTION: Upload
// ============================================================================

/// Accepts multipart document uploads for a later run.
async fn upload_documents(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    mut multipart: Multipart,
) -> Result<Json<Value>, ServerError> {
    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::BadRequest(err.to_string()))?
    {
        let Some(filename) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        let mime_type = field
            .content_type()
            .map(ToString::to_string)
            .ok_or_else(|| ServerError::BadRequest(format!("missing content type: {filename}")))?;
        if !ALLOWED_MIME_TYPES.contains(&mime_type.as_str()) {
            return Err(ServerError::BadRequest(format!("unsupported mime type: {mime_type}")));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::BadRequest(err.to_string()))?;
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ServerError::BadRequest(format!("file too large: {filename}")));
        }
        if uploaded.len() >= MAX_UPLOAD_FILES {
            return Err(ServerError::BadRequest(format!(
                "too many files (max {MAX_UPLOAD_FILES})"
            )));
        }

        let record = state
            .documents
            .save_upload(&tenant_id, &filename, &mime_type, &bytes, state.clock.now())
            .await?;
        info!(tenant = %tenant_id, doc_id = %record.id, size = record.size_bytes, "document uploaded");
        uploaded.push(json!({
            "doc_id": record.id,
            "filename": record.filename,
            "mime_type": record.mime_type,
            "content_hash": record.content_hash,
            "size_bytes": record.size_bytes,
        }));
    }

    let count = uploaded.len();
    Ok(Json(json!({ "uploaded": uploaded, "count": count })))
}

// ============================================================================
// SECTION: Compile
// ============================================================================

/// Compile request body.
#[derive(Debug, Deserialize)]
struct CompileBody {
    /// Declarative pipeline description.
    pipeline: PipelineConfig,
    /// Optional external case identifier.
    case_id: Option<String>,
    /// Identifiers of previously uploaded documents.
    #[serde(default)]
    documents: Vec<String>,
}

/// Compiles a pipeline description into a pending run.
async fn compile_pipeline(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<CompileBody>,
) -> Result<Json<Value>, ServerError> {
    let mut document_refs = Vec::with_capacity(body.documents.len());
    let mut doc_ids = Vec::with_capacity(body.documents.len());
    for raw_id in &body.documents {
        let doc_id = pipeline_gate_core::DocId::new(raw_id.clone());
        let record = state
            .store
            .get_document(&tenant_id, &doc_id)
            .map_err(ServerError::from)?
            .ok_or_else(|| ServerError::BadRequest(format!("unknown document {raw_id}")))?;
        document_refs.push(record.to_ref());
        doc_ids.push(doc_id);
    }

    let request = pipeline_gate_core::CompileRequest {
        pipeline: body.pipeline,
        case_id: body.case_id.map(CaseId::new),
        documents: document_refs,
    };
    let compiled =
        pipeline_gate_core::compile(&request, PlanId::generate(), state.clock.now()).map_err(
            |err| match err {
                PipelineError::PlanInvalid {
                    ..
                } => ServerError::BadRequest(err.to_string()),
                other => ServerError::Internal(other.to_string()),
            },
        )?;

    let run = PipelineRun::pending(
        tenant_id.clone(),
        compiled.plan.clone(),
        compiled.plan_hash.clone(),
        state.clock.now(),
    );
    state.store.create_run(&run).map_err(ServerError::from)?;
    state
        .store
        .bind_documents(&tenant_id, &run.id, run.case_id.as_ref(), &doc_ids)
        .map_err(ServerError::from)?;

    info!(tenant = %tenant_id, run_id = %run.id, plan_hash = %compiled.plan_hash, "run compiled");
    Ok(Json(json!({
        "run_id": run.id,
        "plan_hash": compiled.plan_hash,
        "plan": compiled.plan,
        "status": run.status,
    })))
}

// ============================================================================
// SECTION: Execute
// ============================================================================

/// Execute request body.
#[derive(Debug, Deserialize)]
struct ExecuteBody {
    /// Run to execute.
    run_id: String,
}

/// Starts execution of a pending run.
async fn execute_run(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<ExecutionResult>, ServerError> {
    let run_id = RunId::new(body.run_id);
    let run = state
        .store
        .get_run(&tenant_id, &run_id)
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
    if run.status != RunStatus::Pending {
        return Err(ServerError::BadRequest(format!(
            "run {run_id} is not pending (status {})",
            run.status.as_str()
        )));
    }

    let cfg = state.execution_config()?;
    let result = start_execution(run, &cfg).await;
    Ok(Json(result))
}

// ============================================================================
// SECTION: Status and Listing
// ============================================================================

/// Returns the run summary including plan topology and gate state.
async fn run_status(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let run_id = RunId::new(id);
    let run = state
        .store
        .get_run(&tenant_id, &run_id)
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;

    Ok(Json(json!({
        "run_id": run.id,
        "case_id": run.case_id,
        "status": run.status,
        "current_node": run.current_node,
        "gate_state": run.gate_state,
        "caps": run.spawn_plan.caps,
        "caps_used": run.caps_used,
        "error": run.error,
        "gate_resolutions": run.gate_resolutions,
        "created_at": run.created_at,
        "started_at": run.started_at,
        "completed_at": run.completed_at,
        "plan": {
            "plan_id": run.spawn_plan.plan_id,
            "plan_hash": run.spawn_plan_hash,
            "domain": run.spawn_plan.domain,
            "governance_level": run.spawn_plan.governance_level,
            "pii_policy": run.spawn_plan.pii_policy,
            "nodes": run.spawn_plan.nodes.iter().map(|node| json!({
                "id": node.id,
                "type": node.worker_type,
                "label": node.label,
            })).collect::<Vec<_>>(),
            "gates": run.spawn_plan.gates,
        },
    })))
}

/// Run listing query parameters.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Restrict to one case.
    case_id: Option<String>,
    /// Restrict to one status label.
    status: Option<String>,
    /// Maximum rows returned.
    limit: Option<usize>,
    /// Rows skipped before the first returned row.
    offset: Option<usize>,
}

/// Lists runs for the tenant with optional filters.
async fn list_runs(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ServerError> {
    let status = query
        .status
        .as_deref()
        .map(|label| {
            RunStatus::from_label(label)
                .ok_or_else(|| ServerError::BadRequest(format!("unknown status {label}")))
        })
        .transpose()?;

    let page = state
        .store
        .list_runs(&tenant_id, &RunFilter {
            case_id: query.case_id.map(CaseId::new),
            status,
            limit: query.limit,
            offset: query.offset.unwrap_or(0),
        })
        .map_err(ServerError::from)?;

    let runs: Vec<Value> = page
        .runs
        .iter()
        .map(|run| {
            json!({
                "run_id": run.id,
                "case_id": run.case_id,
                "status": run.status,
                "current_node": run.current_node,
                "caps_used": run.caps_used,
                "created_at": run.created_at,
                "updated_at": run.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "runs": runs, "count": page.count })))
}

// ============================================================================
// SECTION: Gate Resolution
// ============================================================================

/// Gate resolution request body.
#[derive(Debug, Deserialize)]
struct ResolveBody {
    /// Whether the gate is approved.
    approved: bool,
    /// Optional rationale recorded with the decision.
    rationale: Option<String>,
    /// Identity of the resolver (defaults to `api`).
    resolved_by: Option<String>,
}

/// Resolves the gate a run is paused at, resuming on approval.
async fn resolve_run_gate(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path((id, gate_id)): Path<(String, String)>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<ExecutionResult>, ServerError> {
    let run_id = RunId::new(id);
    // Approval leads straight into a resume; refuse early when no model
    // proxy is wired so the run is not left running and unresumable.
    if body.approved && state.model.is_none() {
        return Err(ServerError::ModelUnconfigured);
    }

    let resolution = GateResolution {
        gate_id: gate_id.as_str().into(),
        approved: body.approved,
        resolved_at: state.clock.now(),
        resolved_by: body.resolved_by.unwrap_or_else(|| "api".to_string()),
        rationale: body.rationale,
    };
    let transition = state
        .store
        .resolve_gate(&tenant_id, &run_id, &resolution)
        .map_err(ServerError::from)?;

    match transition {
        GateTransition::NotFound => Err(ServerError::NotFound(format!("run {run_id}"))),
        GateTransition::NotPaused => Err(ServerError::BadRequest(format!(
            "run {run_id} is not paused at a gate"
        ))),
        GateTransition::WrongGate => Err(ServerError::BadRequest(format!(
            "run {run_id} is not paused at gate {gate_id}"
        ))),
        GateTransition::Rejected => {
            let run = state
                .store
                .get_run(&tenant_id, &run_id)
                .map_err(ServerError::from)?
                .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
            info!(run_id = %run_id, gate_id = %gate_id, "gate rejected");
            Ok(Json(ExecutionResult {
                run_id: run.id.clone(),
                status: ExecutionStatus::Failed,
                current_node: run.current_node.clone(),
                gate_id: None,
                error: run.error.clone(),
                evidence_bundle: None,
                caps_used: run.caps_used,
                worker_results: run.worker_results,
            }))
        }
        GateTransition::Approved => {
            let run = state
                .store
                .get_run(&tenant_id, &run_id)
                .map_err(ServerError::from)?
                .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
            let cfg = state.execution_config()?;
            info!(run_id = %run_id, gate_id = %gate_id, "gate approved; resuming");
            Ok(Json(resume_after_gate(run, &cfg).await))
        }
    }
}

// ============================================================================
// SECTION: Evidence
// ============================================================================

/// Returns the evidence bundle for a completed or sealed run.
async fn run_evidence(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let run_id = RunId::new(id);
    let run = state
        .store
        .get_run(&tenant_id, &run_id)
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;
    if !matches!(run.status, RunStatus::Completed | RunStatus::Sealed) {
        return Err(ServerError::BadRequest(format!(
            "run {run_id} has no evidence (status {})",
            run.status.as_str()
        )));
    }

    let bundle = load_bundle(&state.workspace, &run_id)
        .await
        .map_err(|err| ServerError::Internal(err.to_string()))?
        .ok_or_else(|| ServerError::NotFound(format!("evidence for run {run_id}")))?;

    Ok(Json(json!({
        "bundle": bundle,
        "worker_results": run.worker_results,
        "plan": run.spawn_plan,
    })))
}

/// Re-verifies the stored bundle's seal for auditors.
async fn verify_run_evidence(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let run_id = RunId::new(id);
    // Tenant scoping happens through the run lookup.
    state
        .store
        .get_run(&tenant_id, &run_id)
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("run {run_id}")))?;

    let bundle = load_bundle(&state.workspace, &run_id)
        .await
        .map_err(|err| ServerError::Internal(err.to_string()))?
        .ok_or_else(|| ServerError::NotFound(format!("evidence for run {run_id}")))?;

    Ok(Json(json!(bundle.verify())))
}
