// crates/pipeline-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Pipeline Gate Interfaces
// Description: Backend-agnostic interfaces for models, documents, and storage.
// Purpose: Define the contract surfaces the execution core consumes.
// Dependencies: async-trait, serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the execution core integrates with external systems
//! without embedding vendor details. The model vendor sits behind
//! [`ModelProxy`], document binaries behind [`DocStore`], persistence behind
//! [`RunStore`], and wall-clock time behind [`Clock`]. Implementations must
//! be deterministic where the contract says so and fail closed on missing or
//! invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::BundleId;
use crate::core::identifiers::CaseId;
use crate::core::identifiers::DocId;
use crate::core::identifiers::NodeId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::TenantId;
use crate::core::plan::DocumentRef;
use crate::core::plan::GovernanceLevel;
use crate::core::plan::PiiPolicy;
use crate::core::plan::WorkerInstruction;
use crate::core::run::CapsUsed;
use crate::core::run::GateResolution;
use crate::core::run::GateState;
use crate::core::run::PipelineRun;
use crate::core::run::RunStatus;
use crate::core::time::Timestamp;
use crate::core::worker::WorkerDraft;
use crate::core::worker::WorkerOutput;
use crate::core::worker::WorkerType;

// ============================================================================
// SECTION: Model Proxy
// ============================================================================

/// Audit metadata bound to every model call made on behalf of a worker.
///
/// # Invariants
/// - `role` is always `worker:<type>` for worker-scoped calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCallMetadata {
    /// Caller role label.
    pub role: String,
    /// Case the call is made for, when known.
    pub case_id: Option<CaseId>,
    /// Purpose description (the node label).
    pub purpose: String,
}

/// One blocking model request.
///
/// # Invariants
/// - Prompt text is treated as sensitive and never logged verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System prompt framing the call.
    pub system_prompt: String,
    /// User message body.
    pub user_message: String,
    /// Audit metadata for the call.
    pub metadata: ModelCallMetadata,
}

/// Token consumption reported by the model vendor.
///
/// # Invariants
/// - Counters are vendor-reported and not independently verified here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input-side tokens.
    pub input: u64,
    /// Output-side tokens.
    pub output: u64,
}

impl TokenUsage {
    /// Returns the combined input and output token count.
    #[must_use]
    pub const fn total(self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

/// Model completion returned to a worker.
///
/// # Invariants
/// - `content` is the full blocking completion; v1 requires no streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReply {
    /// Completion text.
    pub content: String,
    /// Token consumption for the call.
    pub tokens_used: TokenUsage,
}

/// Model proxy errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Vendor or transport failure.
    #[error("model proxy error: {0}")]
    Proxy(String),
}

/// Vendor-opaque blocking model capability.
#[async_trait]
pub trait ModelProxy: Send + Sync {
    /// Performs one blocking completion.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the vendor call fails.
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError>;
}

// ============================================================================
// SECTION: Document Store
// ============================================================================

/// Document binary returned by the document store.
///
/// # Invariants
/// - `content` is the exact uploaded byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Document bytes.
    pub content: Vec<u8>,
    /// Original filename.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
}

/// Persistent metadata row for an uploaded document.
///
/// # Invariants
/// - `content_hash` matches the stored bytes at `storage_key`.
/// - `run_id` is `None` until the document is bound to a compiled run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier.
    pub id: DocId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Run the document is bound to, once compiled.
    pub run_id: Option<RunId>,
    /// Optional external case identifier.
    pub case_id: Option<CaseId>,
    /// Original filename.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Document size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the document bytes.
    pub content_hash: HashDigest,
    /// Opaque storage location of the bytes.
    pub storage_key: String,
    /// Upload timestamp.
    pub uploaded_at: Timestamp,
}

impl DocumentRecord {
    /// Projects the persistent record into a plan document reference.
    #[must_use]
    pub fn to_ref(&self) -> DocumentRef {
        DocumentRef {
            doc_id: self.id.clone(),
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            content_hash: self.content_hash.clone(),
            size_bytes: self.size_bytes,
        }
    }
}

/// Document store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum DocStoreError {
    /// Underlying I/O failure.
    #[error("document store io error: {0}")]
    Io(String),
    /// Store reported an error.
    #[error("document store error: {0}")]
    Store(String),
}

/// Tenant-scoped document binary store.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Loads a document's bytes and metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DocStoreError`] when loading fails; a missing document is
    /// `Ok(None)`.
    async fn get(
        &self,
        tenant_id: &TenantId,
        doc_id: &DocId,
    ) -> Result<Option<StoredDocument>, DocStoreError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Wall-clock capability; the core never reads time directly.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

// ============================================================================
// SECTION: Run Store
// ============================================================================

/// Run state store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("run store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("run store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("run store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("run store error: {0}")]
    Store(String),
}

/// Filter for run listings.
///
/// # Invariants
/// - `limit` is clamped by implementations to a sane page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// Restrict to one case.
    pub case_id: Option<CaseId>,
    /// Restrict to one status.
    pub status: Option<RunStatus>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
    /// Rows skipped before the first returned row.
    pub offset: usize,
}

/// One page of run records.
///
/// # Invariants
/// - `count` is the total matching rows, not the page length.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPage {
    /// Runs in this page.
    pub runs: Vec<PipelineRun>,
    /// Total matching rows.
    pub count: usize,
}

/// Outcome of a guarded gate resolution.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    /// Gate approved; run transitioned back to running.
    Approved,
    /// Gate rejected; run transitioned to failed.
    Rejected,
    /// Run exists but is not paused at a gate (including already-resolved
    /// gates); no effect.
    NotPaused,
    /// Run is paused at a different gate; no effect.
    WrongGate,
    /// Run does not exist for this tenant.
    NotFound,
}

/// Durable, tenant-scoped authority for run state.
///
/// Every transition is guarded on the legal prior status so concurrent
/// callers cannot double-execute; the boolean results report whether the
/// guarded update actually transitioned the row.
pub trait RunStore: Send + Sync {
    /// Inserts a freshly compiled pending run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn create_run(&self, run: &PipelineRun) -> Result<(), StoreError>;

    /// Loads a run by tenant and identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails; a missing run is
    /// `Ok(None)`.
    fn get_run(&self, tenant_id: &TenantId, run_id: &RunId) -> Result<Option<PipelineRun>, StoreError>;

    /// Transitions `pending` to `running`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn start_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        started_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Persists progress while the run stays `running`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn update_progress(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        current_node: &NodeId,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        updated_at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Transitions `running` to `paused_at_gate`, persisting everything a
    /// later resume needs.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn pause_at_gate(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        gate_state: &GateState,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        updated_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Resolves the gate a run is paused at, appending the resolution and
    /// transitioning status in one atomic update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn resolve_gate(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        resolution: &GateResolution,
    ) -> Result<GateTransition, StoreError>;

    /// Transitions `running` to `completed`, attaching the evidence bundle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn complete_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        bundle_id: &BundleId,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        completed_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Transitions `completed` to `sealed`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn seal_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        updated_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Transitions any non-terminal status to `failed`, persisting partial
    /// state for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn fail_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        error: &str,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        completed_at: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Lists runs for a tenant with optional filters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_runs(&self, tenant_id: &TenantId, filter: &RunFilter) -> Result<RunPage, StoreError>;

    /// Inserts an uploaded document's metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the insert fails.
    fn put_document(&self, record: &DocumentRecord) -> Result<(), StoreError>;

    /// Loads a document metadata row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails; a missing document is
    /// `Ok(None)`.
    fn get_document(
        &self,
        tenant_id: &TenantId,
        doc_id: &DocId,
    ) -> Result<Option<DocumentRecord>, StoreError>;

    /// Binds uploaded documents to a compiled run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn bind_documents(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        case_id: Option<&CaseId>,
        doc_ids: &[DocId],
    ) -> Result<(), StoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Worker Module and Context
// ============================================================================

/// Read-only policy view handed to workers.
///
/// # Invariants
/// - Values are snapshots; workers must not rely on later mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyView {
    /// Declarative stance on personal data.
    pub pii_policy: PiiPolicy,
    /// Governance level of the run.
    pub governance_level: GovernanceLevel,
    /// Pipeline-level constraints.
    pub constraints: Vec<String>,
}

/// Input assembled for one worker spawn.
///
/// # Invariants
/// - `data` keys are the incoming edges' data keys (node identifiers for
///   telemetry nodes).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerInput {
    /// Upstream data keyed by edge data key.
    pub data: BTreeMap<String, Value>,
    /// Documents available to the run.
    pub document_refs: Vec<DocumentRef>,
}

/// Worker invocation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum WorkerInvokeError {
    /// Model proxy failure.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Document store failure.
    #[error(transparent)]
    Document(#[from] DocStoreError),
    /// Artifact write failure (including unsafe names).
    #[error("artifact write failure: {0}")]
    Artifact(String),
}

/// Scoped capabilities handed to one worker spawn.
///
/// The context is the only path workers have to the model, the filesystem,
/// and documents; workers cannot obtain the supervisor, the registry, or
/// another worker's scope through it.
#[async_trait]
pub trait WorkerContext: Send + Sync {
    /// Performs one model completion with this worker's audit metadata.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerInvokeError::Model`] when the vendor call fails.
    async fn model(&self, system_prompt: &str, user_message: &str)
    -> Result<ModelReply, WorkerInvokeError>;

    /// Writes an artifact under this run's artifact directory and returns
    /// its workspace-relative path.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerInvokeError::Artifact`] for unsafe names or I/O
    /// failures.
    async fn write_artifact(&self, name: &str, bytes: &[u8])
    -> Result<String, WorkerInvokeError>;

    /// Reads an uploaded document for this run's tenant.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerInvokeError::Document`] when the store fails; a
    /// missing document is `Ok(None)`.
    async fn read_document(&self, doc_id: &DocId)
    -> Result<Option<StoredDocument>, WorkerInvokeError>;

    /// Returns the read-only policy view for the run.
    fn policy(&self) -> &PolicyView;
}

/// One spawnable worker implementation.
///
/// Modules are pure with respect to the engine: they consume an instruction,
/// an input, and a scoped context, and return a draft output. They cannot
/// register themselves and cannot reach the supervisor.
#[async_trait]
pub trait WorkerModule: Send + Sync {
    /// Returns the allowlisted type this module implements.
    fn worker_type(&self) -> WorkerType;

    /// Executes the worker.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerInvokeError`] when a scoped capability fails; the
    /// supervisor converts the failure into an error output for the node.
    async fn execute(
        &self,
        instruction: &WorkerInstruction,
        input: &WorkerInput,
        ctx: &dyn WorkerContext,
    ) -> Result<WorkerDraft, WorkerInvokeError>;
}
