//! HTTP lineage recorder tests against a mock lineage service.

use std::sync::Arc;
use std::time::Duration;

use ghg_pipeline::error::LineageError;
use ghg_pipeline::lineage::{
    HttpLineageRecorder, LineageAction, LineageClient, LineageRecorder, LineageScope,
};
use ghg_pipeline::pipeline::{
    ExecutionContext, RetryPolicy, StaticBulkTransform, StaticCalculationBackend, WorkflowConfig,
    WorkflowEngine,
};
use ghg_pipeline::WorkflowError;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn recorder_for(server: &MockServer) -> HttpLineageRecorder {
    HttpLineageRecorder::new(format!("{}/lineage", server.uri())).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::exponential(3, Duration::from_millis(1), Duration::from_millis(4))
}

// ============================================================================
// Recorder
// ============================================================================

#[tokio::test]
async fn test_record_posts_event_and_returns_node_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .and(body_partial_json(json!({
            "root_id": "root-1",
            "parent_id": "root-1",
            "storage_type": "s3",
            "storage_location": "s3://raw/activity.csv",
            "action": "RAW_DATA_INPUT"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "node_id": "node-42" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let event = LineageScope::new("root-1", "root-1", "s3")
        .event(LineageAction::RawDataInput, "s3://raw/activity.csv");
    let ack = recorder_for(&mock_server).record(&event).await.unwrap();

    assert_eq!(ack.node_id, "node-42");
}

#[tokio::test]
async fn test_record_sends_timestamp() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "node_id": "n" })))
        .mount(&mock_server)
        .await;

    let event =
        LineageScope::new("r", "p", "s3").event(LineageAction::DqCheckFail, "s3://raw/a.csv");
    recorder_for(&mock_server).record(&event).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["action"], "DQ_CHECK_FAIL");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_record_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(503).set_body_string("throttled"))
        .mount(&mock_server)
        .await;

    let event = LineageScope::new("r", "r", "s3").event(LineageAction::RawDataInput, "s3://raw/a");
    let err = recorder_for(&mock_server).record(&event).await.unwrap_err();

    match err {
        LineageError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "throttled");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_record_invalid_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let event = LineageScope::new("r", "r", "s3").event(LineageAction::RawDataInput, "s3://raw/a");
    let err = recorder_for(&mock_server).record(&event).await.unwrap_err();

    assert!(matches!(err, LineageError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_record_empty_node_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "node_id": "" })))
        .mount(&mock_server)
        .await;

    let event = LineageScope::new("r", "r", "s3").event(LineageAction::RawDataInput, "s3://raw/a");
    let err = recorder_for(&mock_server).record(&event).await.unwrap_err();

    assert!(err.to_string().contains("empty node_id"));
}

// ============================================================================
// Client retry
// ============================================================================

#[tokio::test]
async fn test_client_retries_transient_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "node_id": "node-2" })))
        .mount(&mock_server)
        .await;

    let client = LineageClient::new(Arc::new(recorder_for(&mock_server)), fast_retry());
    let ack = client
        .record(
            &LineageScope::new("r", "r", "s3"),
            LineageAction::GlueBatchSplit,
            "s3://transformed/r",
        )
        .await
        .unwrap();

    assert_eq!(ack.node_id, "node-2");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_client_gives_up_after_budget() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = LineageClient::new(Arc::new(recorder_for(&mock_server)), fast_retry());
    let err = client
        .record(
            &LineageScope::new("r", "r", "s3"),
            LineageAction::RawDataInput,
            "s3://raw/a",
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::LineageRecordingFailed {
            attempts: 3,
            source: LineageError::Status { status: 500, .. },
            ..
        }
    ));
}

// ============================================================================
// Engine over HTTP
// ============================================================================

#[tokio::test]
async fn test_engine_chains_service_node_ids() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/lineage"))
        .and(body_partial_json(json!({ "action": "RAW_DATA_INPUT" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "node_id": "raw-node" })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/lineage"))
        .and(body_partial_json(json!({
            "action": "DQ_CHECK_FAIL",
            "parent_id": "raw-node"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "node_id": "fail-node" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = WorkflowEngine::new(
        WorkflowConfig::new().with_lineage_retry(fast_retry()),
        Arc::new(recorder_for(&mock_server)),
        Arc::new(StaticBulkTransform::new("s3", "transformed", 3)),
        Arc::new(StaticCalculationBackend::new("enriched")),
    )
    .unwrap();

    let ctx = ExecutionContext::new("s3", "s3://raw/activity.csv").with_validation_result("FAILED");
    let terminal = engine.execute(ctx).await;

    assert!(matches!(
        terminal.reason(),
        Some(WorkflowError::ApprovalEscalation)
    ));
    assert_eq!(terminal.context().parent_id, "fail-node");
}
