// crates/pipeline-gate-server/src/error.rs
// ============================================================================
// Module: Server Error Mapping
// Description: Boundary errors and their HTTP status mapping.
// Purpose: Keep status codes stable and bodies free of internal detail.
// Dependencies: axum, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Boundary errors map to stable HTTP statuses: 400 for bad input, 403 for
//! tenant failures, 404 for missing entities, 503 for an unconfigured model
//! proxy, and 500 for internal faults. Internal fault details are logged,
//! not returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use pipeline_gate_core::StoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Boundary errors surfaced as HTTP statuses.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Request input is invalid (400).
    #[error("{0}")]
    BadRequest(String),
    /// Caller is not an acceptable tenant (403).
    #[error("tenant rejected")]
    NotTenant,
    /// Entity does not exist for this tenant (404).
    #[error("not found: {0}")]
    NotFound(String),
    /// Model proxy is not configured (503).
    #[error("model proxy unconfigured")]
    ModelUnconfigured,
    /// Internal failure (500); detail is logged, not returned.
    #[error("internal error")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::NotTenant => (StatusCode::FORBIDDEN, "tenant rejected".to_string()),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
            Self::ModelUnconfigured => {
                (StatusCode::SERVICE_UNAVAILABLE, "model proxy unconfigured".to_string())
            }
            Self::Internal(detail) => {
                error!(detail = %detail, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
