//! Translation properties exercised end to end: payloads and timestamps
//! survive a trip through the service, and decoding follows the configured
//! encoding mode.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use integration_test_utils::{
    init_tracing, service_account_credentials, InMemoryPubSub, RecordingErrorSink,
    RecordingFlowSink, RecordingStatusSink,
};
use pubsub_bridge::{
    EncodingMode, FlowMessage, FlowPayload, InboundSession, OutboundSession, PubSubEnvelope,
    SessionConfig,
};
use std::sync::Arc;

async fn loopback_sessions(
    service: &InMemoryPubSub,
    inbound_config: SessionConfig,
) -> (OutboundSession, InboundSession, Arc<RecordingFlowSink>) {
    let flow = Arc::new(RecordingFlowSink::default());
    let inbound = InboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        inbound_config,
        flow.clone(),
        Arc::new(RecordingErrorSink::default()),
        Arc::new(RecordingStatusSink::default()),
    )
    .await
    .expect("inbound session connects");

    let outbound = OutboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        SessionConfig::new("news"),
        Arc::new(RecordingErrorSink::default()),
        Arc::new(RecordingStatusSink::default()),
    )
    .await
    .expect("outbound session connects");

    (outbound, inbound, flow)
}

#[tokio::test]
async fn binary_payloads_survive_a_trip_through_the_service() {
    init_tracing();
    let service = InMemoryPubSub::new();
    let (outbound, inbound, flow) = loopback_sessions(&service, SessionConfig::new("news")).await;

    let payload = Bytes::from_static(b"\x00\x01binary\xffpayload");
    outbound
        .publish(FlowMessage::new(FlowPayload::Binary(payload.clone())))
        .await;

    let messages = flow.wait_for_messages(1).await;
    assert_eq!(messages[0].payload, FlowPayload::Binary(payload));

    outbound.close().await;
    inbound.close().await.expect("close succeeds");
}

#[tokio::test]
async fn explicit_message_time_survives_at_millisecond_precision() {
    init_tracing();
    let service = InMemoryPubSub::new();
    let (outbound, inbound, flow) = loopback_sessions(&service, SessionConfig::new("news")).await;

    let time = Utc.with_ymd_and_hms(2024, 6, 1, 8, 15, 30).unwrap()
        + chrono::Duration::milliseconds(250);
    let mut message = FlowMessage::new(FlowPayload::Text("stamped".to_string()));
    message.time = Some(time);
    outbound.publish(message).await;

    let messages = flow.wait_for_messages(1).await;
    assert_eq!(messages[0].time, Some(time));

    outbound.close().await;
    inbound.close().await.expect("close succeeds");
}

#[tokio::test]
async fn string_mode_decodes_delivered_bytes_as_text() {
    init_tracing();
    let service = InMemoryPubSub::new();
    let mut config = SessionConfig::new("news");
    config.encoding = Some(EncodingMode::String);
    let (outbound, inbound, flow) = loopback_sessions(&service, config).await;

    outbound
        .publish(FlowMessage::new(FlowPayload::Text("grüße".to_string())))
        .await;

    let messages = flow.wait_for_messages(1).await;
    assert_eq!(messages[0].payload, FlowPayload::Text("grüße".to_string()));

    outbound.close().await;
    inbound.close().await.expect("close succeeds");
}

#[tokio::test]
async fn an_unparseable_timestamp_attribute_fails_soft() {
    init_tracing();
    let service = InMemoryPubSub::new();
    let flow = Arc::new(RecordingFlowSink::default());
    let inbound = InboundSession::connect(
        service.connector(),
        &service_account_credentials(),
        SessionConfig::new("news"),
        flow.clone(),
        Arc::new(RecordingErrorSink::default()),
        Arc::new(RecordingStatusSink::default()),
    )
    .await
    .expect("inbound session connects");

    let mut envelope = PubSubEnvelope {
        data: Bytes::from_static(b"undated"),
        ..Default::default()
    };
    envelope
        .attributes
        .insert("timestamp".to_string(), "not a timestamp".to_string());
    service.deliver_envelope("news", envelope).await;

    let messages = flow.wait_for_messages(1).await;
    assert_eq!(messages[0].payload.as_bytes(), b"undated");
    assert_eq!(messages[0].time, None);

    inbound.close().await.expect("close succeeds");
}
