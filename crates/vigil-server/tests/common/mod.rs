#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use vigil_common::{Metric, MetricKind};
use vigil_server::app;
use vigil_server::config::ServerConfig;
use vigil_server::state::AppState;
use vigil_storage::{MemStorage, Storage, StorageError};

pub const HASH_KEY: &str = "integration-secret";

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_context(config: ServerConfig, storage: Arc<dyn Storage>) -> TestContext {
    let state = AppState::new(config, storage).expect("state should build");
    let app = app::build_http_app(state.clone());
    TestContext { state, app }
}

/// In-memory server without integrity checking.
pub fn build_test_context() -> TestContext {
    build_context(ServerConfig::default(), Arc::new(MemStorage::new("")))
}

/// In-memory server that requires metrics signed with [`HASH_KEY`].
pub fn build_signed_context() -> TestContext {
    let config = ServerConfig {
        hash_key: HASH_KEY.to_string(),
        ..ServerConfig::default()
    };
    build_context(config, Arc::new(MemStorage::new(HASH_KEY)))
}

/// Backend whose every operation fails as if the disk had gone away.
pub struct FailingStorage;

fn disk_gone() -> StorageError {
    StorageError::Io(std::io::Error::other("disk unavailable"))
}

#[async_trait]
impl Storage for FailingStorage {
    async fn get(&self, _kind: MetricKind, _id: &str) -> vigil_storage::Result<Option<Metric>> {
        Err(disk_gone())
    }

    async fn update(&self, _metric: Metric) -> vigil_storage::Result<Metric> {
        Err(disk_gone())
    }

    async fn update_all(&self, _metrics: Vec<Metric>) -> vigil_storage::Result<()> {
        Err(disk_gone())
    }

    async fn all(&self) -> vigil_storage::Result<Vec<Metric>> {
        Err(disk_gone())
    }

    async fn ping(&self) -> vigil_storage::Result<()> {
        Err(disk_gone())
    }

    async fn close(&self) -> vigil_storage::Result<()> {
        Ok(())
    }
}

/// Server on top of [`FailingStorage`].
pub fn build_failing_context() -> TestContext {
    build_context(ServerConfig::default(), Arc::new(FailingStorage))
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");

    let status = resp.status();
    let trace_id = resp
        .headers()
        .get("x-trace-id")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };

    (status, json, trace_id)
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Value,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_raw(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build");
    send(app, req).await
}

pub async fn request_no_body(
    app: &axum::Router,
    method: &str,
    uri: &str,
) -> (StatusCode, Value, Option<String>) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub fn assert_error_envelope(body: &Value, err_code: i64) {
    assert_eq!(body["err_code"], err_code, "unexpected body: {body}");
    assert!(body["err_msg"].is_string());
    assert_eq!(body["trace_id"].as_str().map(str::len), Some(16));
}
