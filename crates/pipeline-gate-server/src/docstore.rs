// crates/pipeline-gate-server/src/docstore.rs
// ============================================================================
// Module: Workspace Document Store
// Description: Document binaries on disk, metadata in the run store.
// Purpose: Give workers tenant-scoped document reads behind the DocStore seam.
// Dependencies: pipeline-gate-core, pipeline-gate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! Uploaded bytes land under `<workspace>/uploads/<doc_id>_<filename>` and a
//! metadata row lands in `pipeline_documents` with no run binding; compile
//! later binds the documents to the created run. Reads re-join metadata and
//! bytes and fail closed when either half is missing or the filename fails
//! safety validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline_gate_core::DocId;
use pipeline_gate_core::DocStore;
use pipeline_gate_core::DocStoreError;
use pipeline_gate_core::DocumentRecord;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::TenantId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::hashing::hash_bytes;
use pipeline_gate_core::interfaces::StoredDocument;
use pipeline_gate_core::validate_artifact_name;
use pipeline_gate_store_sqlite::SqliteRunStore;

use crate::error::ServerError;

// ============================================================================
// SECTION: Workspace Document Store
// ============================================================================

/// Document store joining run-store metadata with workspace files.
///
/// # Invariants
/// - `storage_key` values are always workspace-relative.
#[derive(Clone)]
pub struct WorkspaceDocStore {
    /// Metadata authority.
    store: Arc<SqliteRunStore>,
    /// Workspace root directory.
    workspace: PathBuf,
}

impl WorkspaceDocStore {
    /// Builds a document store over the run store and workspace root.
    #[must_use]
    pub fn new(store: Arc<SqliteRunStore>, workspace: PathBuf) -> Self {
        Self {
            store,
            workspace,
        }
    }

    /// Persists one uploaded document: bytes to disk, metadata to the store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::BadRequest`] for unsafe filenames and
    /// [`ServerError::Internal`] for storage failures.
    pub async fn save_upload(
        &self,
        tenant_id: &TenantId,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
        uploaded_at: Timestamp,
    ) -> Result<DocumentRecord, ServerError> {
        let safe_name = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ServerError::BadRequest(format!("unusable filename: {filename}")))?;
        validate_artifact_name(safe_name)
            .map_err(|err| ServerError::BadRequest(err.to_string()))?;

        let doc_id = DocId::generate();
        let storage_key = format!("uploads/{doc_id}_{safe_name}");
        let target = self.workspace.join(&storage_key);
        let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| self.workspace.clone());
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))?;
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| ServerError::Internal(err.to_string()))?;

        let record = DocumentRecord {
            id: doc_id,
            tenant_id: tenant_id.clone(),
            run_id: None,
            case_id: None,
            filename: safe_name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            content_hash: hash_bytes(bytes),
            storage_key,
            uploaded_at,
        };
        self.store.put_document(&record).map_err(ServerError::from)?;
        Ok(record)
    }
}

#[async_trait]
impl DocStore for WorkspaceDocStore {
    async fn get(
        &self,
        tenant_id: &TenantId,
        doc_id: &DocId,
    ) -> Result<Option<StoredDocument>, DocStoreError> {
        let record = self
            .store
            .get_document(tenant_id, doc_id)
            .map_err(|err| DocStoreError::Store(err.to_string()))?;
        let Some(record) = record else {
            return Ok(None);
        };
        let content = tokio::fs::read(self.workspace.join(&record.storage_key))
            .await
            .map_err(|err| DocStoreError::Io(err.to_string()))?;
        Ok(Some(StoredDocument {
            content,
            filename: record.filename,
            mime_type: record.mime_type,
        }))
    }
}
