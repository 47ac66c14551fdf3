//! Provisioning behavior observed through whole sessions: creation
//! conflicts converge on the surviving resource, other failures are fatal,
//! and only explicitly configured tuning reaches the service.

use integration_test_utils::{
    init_tracing, service_account_credentials, InMemoryPubSub, RecordingErrorSink,
    RecordingFlowSink, RecordingStatusSink,
};
use pubsub_bridge::{
    InboundSession, LinkStatus, OutboundSession, ServiceCode, ServiceStatus, SessionConfig,
    SessionError,
};
use std::sync::Arc;
use std::time::Duration;

fn conflict() -> ServiceStatus {
    ServiceStatus::fail_with_code(ServiceCode::AlreadyExists, "created concurrently")
}

async fn connect_inbound(
    service: &InMemoryPubSub,
    config: SessionConfig,
) -> Result<InboundSession, SessionError> {
    InboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        config,
        Arc::new(RecordingFlowSink::default()),
        Arc::new(RecordingErrorSink::default()),
        Arc::new(RecordingStatusSink::default()),
    )
    .await
}

#[tokio::test]
async fn topic_creation_conflict_converges_with_a_plain_lookup() {
    init_tracing();
    let service = InMemoryPubSub::new();
    service.fail_next_topic(conflict());
    let status = Arc::new(RecordingStatusSink::default());

    let session = OutboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        SessionConfig::new("news"),
        Arc::new(RecordingErrorSink::default()),
        status.clone(),
    )
    .await
    .expect("conflict is absorbed");

    assert_eq!(
        service.topic_calls(),
        vec![("news".to_string(), true), ("news".to_string(), false)]
    );
    assert_eq!(
        status.reports().await.last(),
        Some(&LinkStatus::Connected)
    );
    session.close().await;
}

#[tokio::test]
async fn subscription_creation_conflict_converges_with_a_rebind() {
    init_tracing();
    let service = InMemoryPubSub::new();
    service.fail_next_subscribe(conflict());

    let mut config = SessionConfig::new("news");
    config.subscription = Some("queue".to_string());
    let session = connect_inbound(&service, config)
        .await
        .expect("conflict is absorbed");

    let calls = service.subscribe_calls("news").await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0.as_deref(), Some("queue"));
    assert_eq!(calls[1].0.as_deref(), Some("queue"));
    session.close().await.expect("close succeeds");
}

#[tokio::test]
async fn non_conflict_topic_failure_surfaces_without_a_retry() {
    init_tracing();
    let service = InMemoryPubSub::new();
    service.fail_next_topic(ServiceStatus::fail_with_code(
        ServiceCode::PermissionDenied,
        "topics forbidden",
    ));

    let result = connect_inbound(&service, SessionConfig::new("news")).await;

    assert!(matches!(result, Err(SessionError::Provision(_))));
    assert_eq!(service.topic_calls().len(), 1);
}

#[tokio::test]
async fn only_configured_subscription_tuning_is_forwarded() {
    init_tracing();
    let service = InMemoryPubSub::new();

    let mut config = SessionConfig::new("news");
    config.ack_deadline_seconds = Some(45);
    let session = connect_inbound(&service, config)
        .await
        .expect("session connects");

    let calls = service.subscribe_calls("news").await;
    assert_eq!(calls.len(), 1);
    let options = &calls[0].1;
    assert_eq!(options.ack_deadline, Some(Duration::from_secs(45)));
    assert_eq!(options.encoding, None);
    assert_eq!(options.poll_interval, None);
    assert_eq!(options.timeout, None);
    session.close().await.expect("close succeeds");
}

#[tokio::test]
async fn a_conflicted_rebind_still_yields_a_working_subscription() {
    init_tracing();
    let service = InMemoryPubSub::new();
    service.fail_next_subscribe(conflict());
    let flow = Arc::new(RecordingFlowSink::default());

    let session = InboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        SessionConfig::new("news"),
        flow.clone(),
        Arc::new(RecordingErrorSink::default()),
        Arc::new(RecordingStatusSink::default()),
    )
    .await
    .expect("conflict is absorbed");

    service.deliver("news", b"after the race").await;
    let messages = flow.wait_for_messages(1).await;
    assert_eq!(messages[0].payload.as_bytes(), b"after the race");

    session.close().await.expect("close succeeds");
}
