//! Event and field naming used in `tracing` output across the crate.

/// Stable event names carried in the `event` field.
pub mod events {
    pub const TOPIC_ENSURE: &str = "topic_ensure";
    pub const TOPIC_CREATE_CONFLICT: &str = "topic_create_conflict";
    pub const SUBSCRIPTION_ENSURE: &str = "subscription_ensure";
    pub const SUBSCRIPTION_CREATE_CONFLICT: &str = "subscription_create_conflict";

    pub const INBOUND_CONNECT: &str = "inbound_connect";
    pub const INBOUND_FORWARD: &str = "inbound_forward";
    pub const INBOUND_ACK_FAILED: &str = "inbound_ack_failed";
    pub const INBOUND_STREAM_ERROR: &str = "inbound_stream_error";
    pub const INBOUND_CLOSE: &str = "inbound_close";
    pub const INBOUND_SUBSCRIPTION_DELETE_FAILED: &str = "inbound_subscription_delete_failed";

    pub const OUTBOUND_CONNECT: &str = "outbound_connect";
    pub const OUTBOUND_PUBLISH: &str = "outbound_publish";
    pub const OUTBOUND_PUBLISH_SKIPPED_EMPTY: &str = "outbound_publish_skipped_empty";
    pub const OUTBOUND_PUBLISH_FAILED: &str = "outbound_publish_failed";
    pub const OUTBOUND_DRAINED: &str = "outbound_drained";
    pub const OUTBOUND_CLOSE: &str = "outbound_close";
}

/// Formatting helpers for structured event fields.
pub mod fields {
    use crate::client::PubSubEnvelope;

    pub fn format_subscription_name(name: Option<&str>) -> String {
        name.map(str::to_string)
            .unwrap_or_else(|| "<generated>".to_string())
    }

    pub fn format_ack_token(envelope: &PubSubEnvelope) -> String {
        match &envelope.ack_token {
            Some(token) => token.id().to_string(),
            None => "<none>".to_string(),
        }
    }
}
