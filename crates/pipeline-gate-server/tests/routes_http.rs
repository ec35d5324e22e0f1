// crates/pipeline-gate-server/tests/routes_http.rs
// ============================================================================
// Module: HTTP Route Tests
// Description: Drives the axum router through the full pipeline flow.
// ============================================================================
//! ## Overview
//! Exercises the HTTP boundary end to end over an in-process router: tenant
//! extraction, upload validation, compile → execute → gate → evidence, the
//! 503 model-proxy guard, and tamper detection through the verify route.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use pipeline_gate_core::ModelError;
use pipeline_gate_core::ModelProxy;
use pipeline_gate_core::ModelReply;
use pipeline_gate_core::ModelRequest;
use pipeline_gate_core::TokenUsage;
use pipeline_gate_server::AppState;
use pipeline_gate_server::ServerConfig;
use pipeline_gate_server::build_router;
use pipeline_gate_store_sqlite::SqliteRunStore;
use pipeline_gate_supervisor::SystemClock;
use pipeline_gate_supervisor::bundle::bundle_path;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Deterministic model proxy with role-keyed default replies.
struct StubModel;

#[async_trait]
impl ModelProxy for StubModel {
    async fn complete(&self, request: ModelRequest) -> Result<ModelReply, ModelError> {
        let content = match request.metadata.role.as_str() {
            "worker:extractor" => r#"{"claims": [{"id": 1}]}"#,
            "worker:validator" => r#"{"score": 0.9, "flags": []}"#,
            "worker:writer" => "# Report\n\nReviewed.",
            _ => "{}",
        };
        Ok(ModelReply {
            content: content.to_string(),
            tokens_used: TokenUsage {
                input: 50,
                output: 25,
            },
        })
    }
}

/// In-process server under test.
struct TestServer {
    /// Router under test.
    router: Router,
    /// Workspace directory guard.
    dir: tempfile::TempDir,
}

impl TestServer {
    /// Builds a server with an injected stub model proxy.
    fn new() -> Self {
        Self::build(true)
    }

    /// Builds a server without a model proxy.
    fn without_model() -> Self {
        Self::build(false)
    }

    /// Builds the router over a fresh store and workspace.
    fn build(with_model: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ServerConfig {
            workspace: dir.path().to_path_buf(),
            bind_addr: "127.0.0.1:0".to_string(),
            store_path: dir.path().join("runs.db"),
        };
        let store = Arc::new(SqliteRunStore::open_in_memory().expect("store"));
        let model: Option<Arc<dyn ModelProxy>> =
            if with_model { Some(Arc::new(StubModel)) } else { None };
        let state = AppState::new(&config, store, model, Arc::new(SystemClock));
        Self {
            router: build_router(state),
            dir,
        }
    }

    /// Sends a JSON request with the test tenant header.
    async fn json_request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-tenant-id", "tenant-a");
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Uploads one text document and returns its identifier.
    async fn upload_text(&self, filename: &str, contents: &str) -> String {
        let boundary = "pipelinegateboundary";
        let body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{contents}\r\n--{boundary}--\r\n"
        );
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/pipeline/upload")
                    .header("x-tenant-id", "tenant-a")
                    .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["count"], json!(1));
        value["uploaded"][0]["doc_id"].as_str().expect("doc id").to_string()
    }

    /// Compiles a generic advisory run over one uploaded document.
    async fn compile_generic(&self, doc_id: &str) -> String {
        let (status, body) = self
            .json_request(
                "POST",
                "/pipeline/compile",
                Some(json!({
                    "pipeline": {
                        "domain": "cyber-ir",
                        "governance_level": "advisory",
                        "inputs": ["uploaded documents"],
                        "outputs": ["incident summary"],
                    },
                    "documents": [doc_id],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "body: {body}");
        assert_eq!(body["status"], json!("pending"));
        body["run_id"].as_str().expect("run id").to_string()
    }
}

// ============================================================================
// SECTION: Boundary Checks
// ============================================================================

#[tokio::test]
async fn missing_tenant_header_is_rejected() {
    let server = TestServer::new();
    let response = server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/pipeline/runs")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let server = TestServer::new();
    let (status, body) = server.json_request("GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn upload_rejects_unsupported_mime_type() {
    let server = TestServer::new();
    let boundary = "pipelinegateboundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
         filename=\"payload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\nxx\r\n--{boundary}--\r\n"
    );
    let response = server
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pipeline/upload")
                .header("x-tenant-id", "tenant-a")
                .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let server = TestServer::new();
    let (status, _) = server.json_request("GET", "/pipeline/ghost/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn execute_without_model_proxy_is_unavailable() {
    let server = TestServer::without_model();
    let doc_id = server.upload_text("hello.txt", "hello").await;
    let run_id = server.compile_generic(&doc_id).await;

    let (status, _) = server
        .json_request("POST", "/pipeline/execute", Some(json!({ "run_id": run_id })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// SECTION: Full Flow
// ============================================================================

#[tokio::test]
async fn compile_execute_evidence_flow() {
    let server = TestServer::new();
    let doc_id = server.upload_text("hello.txt", "hello\n").await;
    let run_id = server.compile_generic(&doc_id).await;

    // Evidence is refused while the run is pending.
    let (status, _) =
        server.json_request("GET", &format!("/pipeline/{run_id}/evidence"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, result) = server
        .json_request("POST", "/pipeline/execute", Some(json!({ "run_id": run_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], json!("completed"), "result: {result}");
    assert_eq!(result["worker_results"].as_object().expect("results").len(), 4);

    let (status, summary) =
        server.json_request("GET", &format!("/pipeline/{run_id}/status"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["status"], json!("sealed"));
    assert_eq!(summary["plan"]["nodes"].as_array().expect("nodes").len(), 4);

    let (status, evidence) =
        server.json_request("GET", &format!("/pipeline/{run_id}/evidence"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(evidence["bundle"]["status"], json!("SEALED"));

    let (status, verification) =
        server.json_request("GET", &format!("/pipeline/{run_id}/evidence/verify"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], json!(true));

    let (status, listing) = server.json_request("GET", "/pipeline/runs?status=sealed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], json!(1));
}

#[tokio::test]
async fn va_gate_flow_over_http() {
    let server = TestServer::new();
    let doc_id = server.upload_text("claim.txt", "claim filed").await;
    let (status, body) = server
        .json_request(
            "POST",
            "/pipeline/compile",
            Some(json!({
                "pipeline": {
                    "domain": "va-claims",
                    "governance_level": "strict",
                },
                "case_id": "case-9",
                "documents": [doc_id],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().expect("run id").to_string();

    let (status, result) = server
        .json_request("POST", "/pipeline/execute", Some(json!({ "run_id": run_id })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], json!("paused_at_gate"));
    assert_eq!(result["gate_id"], json!("gate-validation-review"));

    let (status, result) = server
        .json_request(
            "POST",
            &format!("/pipeline/{run_id}/gate/gate-validation-review/resolve"),
            Some(json!({ "approved": true, "resolved_by": "reviewer@example.test" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], json!("paused_at_gate"));
    assert_eq!(result["gate_id"], json!("gate-final-approval"));

    let (status, result) = server
        .json_request(
            "POST",
            &format!("/pipeline/{run_id}/gate/gate-final-approval/resolve"),
            Some(json!({ "approved": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], json!("completed"), "result: {result}");
    assert_eq!(
        result["evidence_bundle"]["gate_records"].as_array().expect("records").len(),
        2
    );
}

#[tokio::test]
async fn gate_rejection_over_http_fails_the_run() {
    let server = TestServer::new();
    let doc_id = server.upload_text("claim.txt", "claim filed").await;
    let (_, body) = server
        .json_request(
            "POST",
            "/pipeline/compile",
            Some(json!({
                "pipeline": { "domain": "va-claims", "governance_level": "strict" },
                "documents": [doc_id],
            })),
        )
        .await;
    let run_id = body["run_id"].as_str().expect("run id").to_string();
    server.json_request("POST", "/pipeline/execute", Some(json!({ "run_id": run_id }))).await;

    let (status, result) = server
        .json_request(
            "POST",
            &format!("/pipeline/{run_id}/gate/gate-validation-review/resolve"),
            Some(json!({ "approved": false, "rationale": "insufficient evidence" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["status"], json!("failed"));
    assert!(
        result["error"].as_str().is_some_and(|e| e.contains("insufficient evidence")),
        "result: {result}"
    );

    // Resolving the same gate again is a stale call.
    let (status, _) = server
        .json_request(
            "POST",
            &format!("/pipeline/{run_id}/gate/gate-validation-review/resolve"),
            Some(json!({ "approved": false })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// SECTION: Tamper Detection
// ============================================================================

#[tokio::test]
async fn tampered_bundle_fails_verification_route() {
    let server = TestServer::new();
    let doc_id = server.upload_text("hello.txt", "hello\n").await;
    let run_id = server.compile_generic(&doc_id).await;
    let (_, result) = server
        .json_request("POST", "/pipeline/execute", Some(json!({ "run_id": run_id })))
        .await;
    assert_eq!(result["status"], json!("completed"));

    // Mutate one artifact's content hash in stored evidence.
    let path = bundle_path(server.dir.path(), &run_id.as_str().into());
    let text = std::fs::read_to_string(&path).expect("bundle file");
    let mut bundle: Value = serde_json::from_str(&text).expect("json");
    bundle["artifacts"][0]["content_hash"] = json!("0".repeat(64));
    std::fs::write(&path, serde_json::to_vec(&bundle).expect("encode")).expect("write");

    let (status, verification) =
        server.json_request("GET", &format!("/pipeline/{run_id}/evidence/verify"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["valid"], json!(false));
    assert_eq!(verification["reason"], json!("Manifest hash mismatch"));
    assert_eq!(verification["checks"]["manifest_integrity"], json!(false));
}
