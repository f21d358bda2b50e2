mod common;

use axum::http::StatusCode;
use common::{
    build_failing_context, build_signed_context, build_test_context, request_no_body, HASH_KEY,
};
use serde_json::json;
use tonic::{Code, Request};
use vigil_common::proto::metric_service_server::MetricService;
use vigil_common::proto::{MetricProto, UpdateMetricsRequest};
use vigil_common::Metric;
use vigil_server::grpc::MetricServiceImpl;

fn batch(metrics: &[Metric]) -> Request<UpdateMetricsRequest> {
    Request::new(UpdateMetricsRequest {
        metrics: metrics.iter().map(MetricProto::from).collect(),
    })
}

#[tokio::test]
async fn grpc_batch_is_queryable_over_http() {
    let ctx = build_test_context();
    let service = MetricServiceImpl::new(ctx.state.clone());

    service
        .update_metrics(batch(&[
            Metric::counter("hits", 5),
            Metric::gauge("temp", 36.6),
            Metric::counter("hits", 3),
        ]))
        .await
        .unwrap();

    let (status, body, _) = request_no_body(&ctx.app, "GET", "/value/counter/hits").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(8));

    // Empty batches are accepted.
    service.update_metrics(batch(&[])).await.unwrap();
}

#[tokio::test]
async fn grpc_maps_metric_errors_to_status_codes() {
    let ctx = build_test_context();
    let service = MetricServiceImpl::new(ctx.state.clone());

    let unknown = Request::new(UpdateMetricsRequest {
        metrics: vec![MetricProto {
            id: "x".to_string(),
            kind: "histogram".to_string(),
            value: Some(1.0),
            delta: None,
            hash: None,
        }],
    });
    let status = service.update_metrics(unknown).await.unwrap_err();
    assert_eq!(status.code(), Code::Unimplemented);

    let mut invalid = Metric::counter("hits", 1);
    invalid.delta = None;
    let status = service
        .update_metrics(batch(&[Metric::gauge("temp", 1.0), invalid]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    assert!(ctx.state.storage.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn grpc_checks_integrity_tags() {
    let ctx = build_signed_context();
    let service = MetricServiceImpl::new(ctx.state.clone());

    let mut signed = Metric::counter("hits", 2);
    signed.sign(HASH_KEY);
    service.update_metrics(batch(&[signed])).await.unwrap();

    let status = service
        .update_metrics(batch(&[Metric::counter("hits", 2)]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn grpc_reports_storage_failure_as_internal() {
    let ctx = build_failing_context();
    let service = MetricServiceImpl::new(ctx.state.clone());

    let status = service
        .update_metrics(batch(&[Metric::counter("hits", 1)]))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Internal);
}
