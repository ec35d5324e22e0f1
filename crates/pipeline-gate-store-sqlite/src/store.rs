// crates/pipeline-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run State Store
// Description: Durable RunStore backed by SQLite WAL.
// Purpose: Persist run and document state with status-guarded transitions.
// Dependencies: pipeline-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The store keeps two tables: `pipeline_runs` and `pipeline_documents`,
//! both keyed by `(tenant_id, id)`. Structured fields persist as JSON text
//! columns; timestamps persist as RFC3339 text. The state machine is
//! enforced in the WHERE clauses of the transition UPDATEs and the affected
//! row count reports whether a transition actually happened, which makes
//! repeated calls harmless.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use pipeline_gate_core::BundleId;
use pipeline_gate_core::CapsUsed;
use pipeline_gate_core::CaseId;
use pipeline_gate_core::DocId;
use pipeline_gate_core::DocumentRecord;
use pipeline_gate_core::GateResolution;
use pipeline_gate_core::GateState;
use pipeline_gate_core::GateTransition;
use pipeline_gate_core::HashDigest;
use pipeline_gate_core::NodeId;
use pipeline_gate_core::PipelineError;
use pipeline_gate_core::PipelineRun;
use pipeline_gate_core::RunFilter;
use pipeline_gate_core::RunId;
use pipeline_gate_core::RunPage;
use pipeline_gate_core::RunStatus;
use pipeline_gate_core::RunStore;
use pipeline_gate_core::SpawnPlan;
use pipeline_gate_core::StoreError;
use pipeline_gate_core::TenantId;
use pipeline_gate_core::Timestamp;
use pipeline_gate_core::WorkerOutput;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default run listing page size.
const DEFAULT_LIST_LIMIT: usize = 50;
/// Maximum run listing page size.
const MAX_LIST_LIMIT: usize = 200;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database-level failure.
    #[error("sqlite failure: {0}")]
    Db(String),
    /// Stored data failed to deserialize.
    #[error("sqlite corruption: {0}")]
    Corrupt(String),
    /// Data could not be serialized for storage.
    #[error("sqlite serialization failure: {0}")]
    Serialize(String),
    /// Configuration or input data is invalid.
    #[error("sqlite invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(err: SqliteStoreError) -> Self {
        match err {
            SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Serialize(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// Configuration for the `SQLite` run store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable run store over one `SQLite` connection.
///
/// # Invariants
/// - The connection is serialized behind a mutex; transitions run inside
///   transactions where multiple statements are involved.
#[derive(Clone)]
pub struct SqliteRunStore {
    /// Shared serialized connection.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Opens (or creates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// migrated.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(&config.path)?;
        Self::initialize(conn, config)
    }

    /// Opens an in-memory store (tests and ephemeral deployments).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let config = SqliteStoreConfig {
            path: PathBuf::from(":memory:"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
        };
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, &config)
    }

    /// Applies pragmas and migrations to a fresh connection.
    fn initialize(
        conn: Connection,
        config: &SqliteStoreConfig,
    ) -> Result<Self, SqliteStoreError> {
        conn.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
        conn.pragma_update(None, "synchronous", "full")?;
        conn.pragma_update(None, "busy_timeout", i64::try_from(config.busy_timeout_ms).unwrap_or(i64::MAX))?;
        conn.pragma_update(None, "foreign_keys", "on")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.conn
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }
}

/// Creates the schema and records the store version.
fn migrate(conn: &Connection) -> Result<(), SqliteStoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS pipeline_runs (
             tenant_id TEXT NOT NULL,
             id TEXT NOT NULL,
             case_id TEXT,
             spawn_plan TEXT NOT NULL,
             spawn_plan_hash TEXT NOT NULL,
             status TEXT NOT NULL,
             current_node TEXT,
             gate_state TEXT,
             worker_results TEXT NOT NULL,
             evidence_bundle_id TEXT,
             caps_used TEXT NOT NULL,
             error TEXT,
             gate_resolutions TEXT NOT NULL,
             started_at TEXT,
             completed_at TEXT,
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL,
             PRIMARY KEY (tenant_id, id)
         );
         CREATE INDEX IF NOT EXISTS idx_pipeline_runs_case
             ON pipeline_runs (tenant_id, case_id);
         CREATE INDEX IF NOT EXISTS idx_pipeline_runs_status
             ON pipeline_runs (tenant_id, status);
         CREATE TABLE IF NOT EXISTS pipeline_documents (
             tenant_id TEXT NOT NULL,
             id TEXT NOT NULL,
             run_id TEXT,
             case_id TEXT,
             filename TEXT NOT NULL,
             mime_type TEXT NOT NULL,
             size_bytes INTEGER NOT NULL,
             content_hash TEXT NOT NULL,
             storage_key TEXT NOT NULL,
             uploaded_at TEXT NOT NULL,
             PRIMARY KEY (tenant_id, id)
         );",
    )?;

    let version: Option<i64> = conn
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
        }
        Some(found) if found == SCHEMA_VERSION => {}
        Some(found) => {
            return Err(SqliteStoreError::Invalid(format!(
                "unsupported store schema version {found} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Serialization Helpers
// ============================================================================

/// Serializes a value to a JSON column.
fn to_json<T: Serialize>(value: &T) -> Result<String, SqliteStoreError> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Serialize(err.to_string()))
}

/// Deserializes a JSON column, failing closed on corruption.
fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, SqliteStoreError> {
    serde_json::from_str(text).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Formats a timestamp for a TEXT column.
fn ts_text(ts: Timestamp) -> Result<String, SqliteStoreError> {
    ts.to_rfc3339().map_err(|err| SqliteStoreError::Serialize(err.to_string()))
}

/// Parses a timestamp from a TEXT column, failing closed on corruption.
fn ts_parse(text: &str) -> Result<Timestamp, SqliteStoreError> {
    Timestamp::from_rfc3339(text).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
}

/// Raw run row fetched before typed conversion.
struct RawRunRow {
    /// `id` column.
    id: String,
    /// `case_id` column.
    case_id: Option<String>,
    /// `tenant_id` column.
    tenant_id: String,
    /// `spawn_plan` column.
    spawn_plan: String,
    /// `spawn_plan_hash` column.
    spawn_plan_hash: String,
    /// `status` column.
    status: String,
    /// `current_node` column.
    current_node: Option<String>,
    /// `gate_state` column.
    gate_state: Option<String>,
    /// `worker_results` column.
    worker_results: String,
    /// `evidence_bundle_id` column.
    evidence_bundle_id: Option<String>,
    /// `caps_used` column.
    caps_used: String,
    /// `error` column.
    error: Option<String>,
    /// `gate_resolutions` column.
    gate_resolutions: String,
    /// `started_at` column.
    started_at: Option<String>,
    /// `completed_at` column.
    completed_at: Option<String>,
    /// `created_at` column.
    created_at: String,
    /// `updated_at` column.
    updated_at: String,
}

/// Column list shared by run SELECT statements.
const RUN_COLUMNS: &str = "id, case_id, tenant_id, spawn_plan, spawn_plan_hash, status, \
                           current_node, gate_state, worker_results, evidence_bundle_id, \
                           caps_used, error, gate_resolutions, started_at, completed_at, \
                           created_at, updated_at";

impl RawRunRow {
    /// Reads a raw row from a result row.
    fn read(row: &rusqlite::Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            case_id: row.get(1)?,
            tenant_id: row.get(2)?,
            spawn_plan: row.get(3)?,
            spawn_plan_hash: row.get(4)?,
            status: row.get(5)?,
            current_node: row.get(6)?,
            gate_state: row.get(7)?,
            worker_results: row.get(8)?,
            evidence_bundle_id: row.get(9)?,
            caps_used: row.get(10)?,
            error: row.get(11)?,
            gate_resolutions: row.get(12)?,
            started_at: row.get(13)?,
            completed_at: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    /// Converts the raw row to a typed run record, failing closed on
    /// corruption.
    fn into_run(self) -> Result<PipelineRun, SqliteStoreError> {
        let status = RunStatus::from_label(&self.status).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("unknown run status {}", self.status))
        })?;
        let tenant_id = TenantId::parse(&self.tenant_id)
            .ok_or_else(|| SqliteStoreError::Corrupt("empty tenant id".to_string()))?;
        let spawn_plan: SpawnPlan = from_json(&self.spawn_plan)?;
        let worker_results: BTreeMap<NodeId, WorkerOutput> = from_json(&self.worker_results)?;
        let caps_used: CapsUsed = from_json(&self.caps_used)?;
        let gate_state: Option<GateState> =
            self.gate_state.as_deref().map(from_json).transpose()?;
        let gate_resolutions: Vec<GateResolution> = from_json(&self.gate_resolutions)?;
        let current_node = self
            .current_node
            .as_deref()
            .map(|raw| {
                NodeId::parse(raw).ok_or_else(|| {
                    SqliteStoreError::Corrupt(format!("invalid current node {raw}"))
                })
            })
            .transpose()?;

        Ok(PipelineRun {
            id: RunId::new(self.id),
            case_id: self.case_id.map(CaseId::new),
            tenant_id,
            spawn_plan,
            spawn_plan_hash: HashDigest::from_hex_unchecked(self.spawn_plan_hash),
            status,
            current_node,
            gate_state,
            worker_results,
            evidence_bundle_id: self.evidence_bundle_id.map(BundleId::new),
            caps_used,
            error: self.error,
            gate_resolutions,
            started_at: self.started_at.as_deref().map(ts_parse).transpose()?,
            completed_at: self.completed_at.as_deref().map(ts_parse).transpose()?,
            created_at: ts_parse(&self.created_at)?,
            updated_at: ts_parse(&self.updated_at)?,
        })
    }
}

// ============================================================================
// SECTION: RunStore Implementation
// ============================================================================

impl RunStore for SqliteRunStore {
    fn create_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pipeline_runs (tenant_id, id, case_id, spawn_plan, spawn_plan_hash, \
             status, current_node, gate_state, worker_results, evidence_bundle_id, caps_used, \
             error, gate_resolutions, started_at, completed_at, created_at, updated_at) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                run.tenant_id.as_str(),
                run.id.as_str(),
                run.case_id.as_ref().map(CaseId::as_str),
                to_json(&run.spawn_plan).map_err(StoreError::from)?,
                run.spawn_plan_hash.as_str(),
                run.status.as_str(),
                run.current_node.as_ref().map(NodeId::as_str),
                run.gate_state.as_ref().map(to_json).transpose().map_err(StoreError::from)?,
                to_json(&run.worker_results).map_err(StoreError::from)?,
                run.evidence_bundle_id.as_ref().map(BundleId::as_str),
                to_json(&run.caps_used).map_err(StoreError::from)?,
                run.error.as_deref(),
                to_json(&run.gate_resolutions).map_err(StoreError::from)?,
                run.started_at.map(ts_text).transpose().map_err(StoreError::from)?,
                run.completed_at.map(ts_text).transpose().map_err(StoreError::from)?,
                ts_text(run.created_at).map_err(StoreError::from)?,
                ts_text(run.updated_at).map_err(StoreError::from)?,
            ],
        )
        .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn get_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
    ) -> Result<Option<PipelineRun>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE tenant_id = ?1 AND id = ?2"
                ),
                params![tenant_id.as_str(), run_id.as_str()],
                RawRunRow::read,
            )
            .optional()
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        raw.map(RawRunRow::into_run).transpose().map_err(StoreError::from)
    }

    fn start_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        started_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let at = ts_text(started_at).map_err(StoreError::from)?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET status = 'running', started_at = ?3, updated_at = ?3 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'pending'",
                params![tenant_id.as_str(), run_id.as_str(), at],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(rows == 1)
    }

    fn update_progress(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        current_node: &NodeId,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        updated_at: Timestamp,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET current_node = ?3, caps_used = ?4, \
                 worker_results = ?5, updated_at = ?6 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'running'",
                params![
                    tenant_id.as_str(),
                    run_id.as_str(),
                    current_node.as_str(),
                    to_json(caps_used).map_err(StoreError::from)?,
                    to_json(worker_results).map_err(StoreError::from)?,
                    ts_text(updated_at).map_err(StoreError::from)?,
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        if rows == 0 {
            return Err(StoreError::Store(format!("run {run_id} is not running")));
        }
        Ok(())
    }

    fn pause_at_gate(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        gate_state: &GateState,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        updated_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET status = 'paused_at_gate', gate_state = ?3, \
                 current_node = ?4, caps_used = ?5, worker_results = ?6, updated_at = ?7 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'running'",
                params![
                    tenant_id.as_str(),
                    run_id.as_str(),
                    to_json(gate_state).map_err(StoreError::from)?,
                    gate_state.after_node.as_str(),
                    to_json(caps_used).map_err(StoreError::from)?,
                    to_json(worker_results).map_err(StoreError::from)?,
                    ts_text(updated_at).map_err(StoreError::from)?,
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(rows == 1)
    }

    fn resolve_gate(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        resolution: &GateResolution,
    ) -> Result<GateTransition, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction()
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        let row: Option<(String, Option<String>, String)> = tx
            .query_row(
                "SELECT status, gate_state, gate_resolutions FROM pipeline_runs \
                 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), run_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        let Some((status, gate_state_json, resolutions_json)) = row else {
            return Ok(GateTransition::NotFound);
        };
        if status != RunStatus::PausedAtGate.as_str() {
            return Ok(GateTransition::NotPaused);
        }
        let gate_state: GateState = gate_state_json
            .as_deref()
            .map(from_json)
            .transpose()
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::Corrupt("paused run without gate state".to_string()))?;
        if gate_state.gate_id != resolution.gate_id {
            return Ok(GateTransition::WrongGate);
        }

        let mut resolutions: Vec<GateResolution> =
            from_json(&resolutions_json).map_err(StoreError::from)?;
        resolutions.push(resolution.clone());
        let resolutions_text = to_json(&resolutions).map_err(StoreError::from)?;
        let at = ts_text(resolution.resolved_at).map_err(StoreError::from)?;

        let rows = if resolution.approved {
            tx.execute(
                "UPDATE pipeline_runs SET status = 'running', gate_state = NULL, \
                 gate_resolutions = ?3, updated_at = ?4 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'paused_at_gate'",
                params![tenant_id.as_str(), run_id.as_str(), resolutions_text, at],
            )
        } else {
            let error = PipelineError::GateRejected {
                gate_id: resolution.gate_id.clone(),
                resolved_by: resolution.resolved_by.clone(),
                rationale: resolution.rationale.clone(),
            }
            .to_string();
            tx.execute(
                "UPDATE pipeline_runs SET status = 'failed', gate_state = NULL, \
                 gate_resolutions = ?3, error = ?4, completed_at = ?5, updated_at = ?5 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'paused_at_gate'",
                params![tenant_id.as_str(), run_id.as_str(), resolutions_text, error, at],
            )
        }
        .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        tx.commit().map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        if rows != 1 {
            return Ok(GateTransition::NotPaused);
        }
        debug!(run_id = %run_id, gate_id = %resolution.gate_id, approved = resolution.approved, "gate resolved");
        Ok(if resolution.approved {
            GateTransition::Approved
        } else {
            GateTransition::Rejected
        })
    }

    fn complete_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        bundle_id: &BundleId,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        completed_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET status = 'completed', evidence_bundle_id = ?3, \
                 caps_used = ?4, worker_results = ?5, completed_at = ?6, updated_at = ?6 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'running'",
                params![
                    tenant_id.as_str(),
                    run_id.as_str(),
                    bundle_id.as_str(),
                    to_json(caps_used).map_err(StoreError::from)?,
                    to_json(worker_results).map_err(StoreError::from)?,
                    ts_text(completed_at).map_err(StoreError::from)?,
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(rows == 1)
    }

    fn seal_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        updated_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET status = 'sealed', updated_at = ?3 \
                 WHERE tenant_id = ?1 AND id = ?2 AND status = 'completed'",
                params![
                    tenant_id.as_str(),
                    run_id.as_str(),
                    ts_text(updated_at).map_err(StoreError::from)?,
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(rows == 1)
    }

    fn fail_run(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        error: &str,
        caps_used: &CapsUsed,
        worker_results: &BTreeMap<NodeId, WorkerOutput>,
        completed_at: Timestamp,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn
            .execute(
                "UPDATE pipeline_runs SET status = 'failed', error = ?3, gate_state = NULL, \
                 caps_used = ?4, worker_results = ?5, completed_at = ?6, updated_at = ?6 \
                 WHERE tenant_id = ?1 AND id = ?2 \
                 AND status NOT IN ('completed', 'failed', 'sealed')",
                params![
                    tenant_id.as_str(),
                    run_id.as_str(),
                    error,
                    to_json(caps_used).map_err(StoreError::from)?,
                    to_json(worker_results).map_err(StoreError::from)?,
                    ts_text(completed_at).map_err(StoreError::from)?,
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(rows == 1)
    }

    fn list_runs(&self, tenant_id: &TenantId, filter: &RunFilter) -> Result<RunPage, StoreError> {
        let conn = self.lock()?;
        let limit = filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);

        let mut clauses = vec!["tenant_id = ?1".to_string()];
        let mut args: Vec<String> = vec![tenant_id.as_str().to_string()];
        if let Some(case_id) = &filter.case_id {
            args.push(case_id.as_str().to_string());
            clauses.push(format!("case_id = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(status.as_str().to_string());
            clauses.push(format!("status = ?{}", args.len()));
        }
        let where_clause = clauses.join(" AND ");

        let count: usize = conn
            .query_row(
                &format!("SELECT COUNT(1) FROM pipeline_runs WHERE {where_clause}"),
                rusqlite::params_from_iter(args.iter()),
                |row| row.get::<_, i64>(0),
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))
            .and_then(|total| {
                usize::try_from(total)
                    .map_err(|err| StoreError::Invalid(err.to_string()))
            })?;

        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE {where_clause} \
             ORDER BY created_at DESC LIMIT {limit} OFFSET {offset}",
            offset = filter.offset
        );
        let mut statement = conn
            .prepare(&sql)
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        let rows = statement
            .query_map(rusqlite::params_from_iter(args.iter()), RawRunRow::read)
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        let mut runs = Vec::new();
        for raw in rows {
            let raw = raw.map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
            runs.push(raw.into_run().map_err(StoreError::from)?);
        }
        Ok(RunPage {
            runs,
            count,
        })
    }

    fn put_document(&self, record: &DocumentRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pipeline_documents (tenant_id, id, run_id, case_id, filename, \
             mime_type, size_bytes, content_hash, storage_key, uploaded_at) VALUES \
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.tenant_id.as_str(),
                record.id.as_str(),
                record.run_id.as_ref().map(RunId::as_str),
                record.case_id.as_ref().map(CaseId::as_str),
                record.filename,
                record.mime_type,
                i64::try_from(record.size_bytes)
                    .map_err(|err| StoreError::Invalid(err.to_string()))?,
                record.content_hash.as_str(),
                record.storage_key,
                ts_text(record.uploaded_at).map_err(StoreError::from)?,
            ],
        )
        .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn get_document(
        &self,
        tenant_id: &TenantId,
        doc_id: &DocId,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, tenant_id, run_id, case_id, filename, mime_type, size_bytes, \
                 content_hash, storage_key, uploaded_at FROM pipeline_documents \
                 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.as_str(), doc_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                        row.get::<_, String>(9)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;

        row.map(
            |(
                id,
                tenant,
                run_id,
                case_id,
                filename,
                mime_type,
                size_bytes,
                content_hash,
                storage_key,
                uploaded_at,
            )| {
                Ok(DocumentRecord {
                    id: DocId::new(id),
                    tenant_id: TenantId::parse(&tenant).ok_or_else(|| {
                        StoreError::Corrupt("empty tenant id".to_string())
                    })?,
                    run_id: run_id.map(RunId::new),
                    case_id: case_id.map(CaseId::new),
                    filename,
                    mime_type,
                    size_bytes: u64::try_from(size_bytes)
                        .map_err(|err| StoreError::Corrupt(err.to_string()))?,
                    content_hash: HashDigest::from_hex_unchecked(content_hash),
                    storage_key,
                    uploaded_at: ts_parse(&uploaded_at).map_err(StoreError::from)?,
                })
            },
        )
        .transpose()
    }

    fn bind_documents(
        &self,
        tenant_id: &TenantId,
        run_id: &RunId,
        case_id: Option<&CaseId>,
        doc_ids: &[DocId],
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction()
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        for doc_id in doc_ids {
            tx.execute(
                "UPDATE pipeline_documents SET run_id = ?3, case_id = ?4 \
                 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    tenant_id.as_str(),
                    doc_id.as_str(),
                    run_id.as_str(),
                    case_id.map(CaseId::as_str),
                ],
            )
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        }
        tx.commit().map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|err| StoreError::from(SqliteStoreError::from(err)))?;
        Ok(())
    }
}
