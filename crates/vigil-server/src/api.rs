use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use vigil_common::{Metric, MetricError, MetricKind};
use vigil_storage::StorageError;

/// API 错误响应
#[derive(Serialize)]
pub struct ApiError {
    /// 错误码
    pub err_code: i32,
    /// 错误信息
    pub err_msg: String,
    /// 链路追踪 ID
    pub trace_id: String,
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "forbidden" => 1006,
        "integrity_failed" => 1010,
        "unknown_type" => 1011,
        "payload_too_large" => 1013,
        "storage_error" => 1501,
        "internal_error" => 1500,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

/// 格式错误或签名不符返回 400，未知指标类型返回 501。
fn metric_error_response(trace_id: &str, err: &MetricError) -> Response {
    let msg = err.to_string();
    match err {
        MetricError::Validation(_) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &msg)
        }
        MetricError::Integrity { .. } => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "integrity_failed", &msg)
        }
        MetricError::UnknownType(_) => {
            error_response(StatusCode::NOT_IMPLEMENTED, trace_id, "unknown_type", &msg)
        }
    }
}

fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    if let StorageError::Invalid(e) = err {
        return metric_error_response(trace_id, e);
    }
    tracing::error!(trace_id = %trace_id, error = %err, "Storage operation failed");
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        trace_id,
        "storage_error",
        &err.to_string(),
    )
}

/// Metric as received over HTTP, before its kind is checked. Parsing the
/// kind separately lets an unknown kind map to 501 instead of a generic
/// JSON error.
#[derive(Deserialize)]
struct MetricPayload {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    value: Option<f64>,
    delta: Option<i64>,
    hash: Option<String>,
}

impl MetricPayload {
    fn into_metric(self) -> Result<Metric, MetricError> {
        Ok(Metric {
            kind: self.kind.parse()?,
            id: self.id,
            value: self.value,
            delta: self.delta,
            hash: self.hash,
        })
    }

    /// Converts, validates and checks the integrity tag.
    fn accept(self, hash_key: &str) -> Result<Metric, MetricError> {
        let metric = self.into_metric()?;
        metric.validate()?;
        metric.verify_hash(hash_key)?;
        Ok(metric)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(trace_id: &str, body: &[u8]) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "bad_request",
            &format!("invalid JSON body: {e}"),
        )
    })
}

/// `POST /updates/`：批量更新，整个 JSON 数组通过一次 `update_all` 写入。
/// 任一指标不合法则拒绝整个请求。
async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let payloads: Vec<MetricPayload> = match parse_json(&trace_id, &body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let mut metrics = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match payload.accept(&state.hash_key) {
            Ok(metric) => metrics.push(metric),
            Err(e) => return metric_error_response(&trace_id, &e),
        }
    }

    let count = metrics.len();
    match state.storage.update_all(metrics).await {
        Ok(()) => {
            tracing::debug!(trace_id = %trace_id.0, count, "Stored metric batch");
            StatusCode::OK.into_response()
        }
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// `POST /update/`：更新单个 JSON 指标，返回合并后的结果。
async fn update_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metric = match parse_json::<MetricPayload>(&trace_id, &body)
        .and_then(|p| p.accept(&state.hash_key).map_err(|e| metric_error_response(&trace_id, &e)))
    {
        Ok(metric) => metric,
        Err(resp) => return resp,
    };

    match state.storage.update(metric).await {
        Ok(stored) => Json(stored).into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// `POST /update/{kind}/{id}/{value}`：路径形式更新，不带签名。
async fn update_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Response {
    let metric = match Metric::from_parts(&kind, &id, &value) {
        Ok(metric) => metric,
        Err(e) => return metric_error_response(&trace_id, &e),
    };

    match state.storage.update(metric).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// `GET /value/{kind}/{id}`：以纯文本返回指标值，未知类型视为不存在。
async fn value_text(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "metric not found");
    };

    match state.storage.get(kind, &id).await {
        Ok(Some(metric)) => metric.value_text().into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "metric not found"),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

#[derive(Deserialize)]
struct MetricLookup {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// `POST /value/`：按 `{id, type}` 查询并返回已存储的指标。
async fn value_json(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let lookup: MetricLookup = match parse_json(&trace_id, &body) {
        Ok(l) => l,
        Err(resp) => return resp,
    };
    let kind = match lookup.kind.parse::<MetricKind>() {
        Ok(kind) => kind,
        Err(e) => return metric_error_response(&trace_id, &e),
    };

    match state.storage.get(kind, &lookup.id).await {
        Ok(Some(metric)) => Json(metric).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "metric not found"),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// `GET /ping`：存储健康检查。
async fn ping(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    match state.storage.ping().await {
        Ok(()) => "pong".into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `GET /`：以 HTML 表格列出全部指标。
async fn index(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    let metrics = match state.storage.all().await {
        Ok(metrics) => metrics,
        Err(e) => return storage_error_response(&trace_id, &e),
    };

    let mut html = String::from(
        "<!DOCTYPE html><html><head><title>vigil metrics</title></head><body>\
         <table><tr><th>Type</th><th>Name</th><th>Value</th></tr>",
    );
    for metric in &metrics {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            metric.kind,
            escape_html(&metric.id),
            metric.value_text()
        );
    }
    html.push_str("</table></body></html>");
    Html(html).into_response()
}

pub fn metric_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/update/", post(update_json))
        .route("/update/{kind}/{id}/{value}", post(update_path))
        .route("/updates/", post(update_batch))
        .route("/value/", post(value_json))
        .route("/value/{kind}/{id}", get(value_text))
}
