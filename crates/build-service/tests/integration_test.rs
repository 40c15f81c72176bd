//! Integration tests for the build service API

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use build_service::{create_router, AppState};
use forge_pipeline::{BackendRegistry, MemoryBlobStore, Orchestrator, OrchestratorConfig};
use serde_json::json;
use tower::ServiceExt; // for `oneshot`

/// Helper to create a test app backed by an in-memory blob store
fn create_test_app() -> (axum::Router, Arc<MemoryBlobStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryBlobStore::new());

    let orchestrator = Orchestrator::new(
        store.clone(),
        BackendRegistry::with_cli_backends(None),
        OrchestratorConfig {
            build_dir: dir.path().join("builds"),
            ptau_cache_dir: dir.path().join("ptau"),
            tool_dir: Some(PathBuf::from(dir.path())),
        },
    );
    std::fs::create_dir_all(dir.path().join("builds")).unwrap();

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    (create_router(state), store, dir)
}

fn build_payload(protocol: &str) -> serde_json::Value {
    json!({
        "payload": {
            "action": "build",
            "requestId": "req123abc",
            "files": {
                "multiplier.circom": { "code": "template Multiplier() {}" }
            },
            "circuit": {
                "file": "multiplier",
                "template": "Multiplier",
                "params": [],
                "pubs": []
            },
            "circomPath": "circom-v2.1.8",
            "protocol": protocol
        }
    })
}

async fn post_build(app: axum::Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/build")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _store, _dir) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "build-service");
}

#[tokio::test]
async fn test_unknown_action_rejected() {
    let (app, store, _dir) = create_test_app();

    let (status, body) = post_build(app, json!({ "payload": { "action": "deploy" } })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorType"], "error");
    assert_eq!(body["errorMessage"], "invalid_command");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_missing_action_rejected() {
    let (app, _store, _dir) = create_test_app();

    let (status, body) = post_build(app, json!({ "payload": { "requestId": "req123abc" } })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorMessage"], "invalid_command");
}

#[tokio::test]
async fn test_unsupported_protocol_fails_without_side_effects() {
    let (app, store, dir) = create_test_app();

    let (status, body) = post_build(app, build_payload("stark")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errorType"], "error");
    assert_eq!(body["errorMessage"], "invalid_protocol");

    // Rejected before any blob write or workspace staging.
    assert!(store.is_empty());
    assert_eq!(
        std::fs::read_dir(dir.path().join("builds")).unwrap().count(),
        0
    );
}

#[tokio::test]
async fn test_unsupported_snarkjs_version_fails() {
    let (app, store, _dir) = create_test_app();

    let mut payload = build_payload("groth16");
    payload["payload"]["snarkjsVersion"] = json!("0.5.0");
    let (status, body) = post_build(app, payload).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errorMessage"], "invalid_snarkjs_version");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_malformed_request_id_fails() {
    let (app, _store, _dir) = create_test_app();

    let mut payload = build_payload("groth16");
    payload["payload"]["requestId"] = json!("../escape");
    let (status, body) = post_build(app, payload).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["errorMessage"], "invalid_requestId");
}
