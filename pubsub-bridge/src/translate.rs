//! Pure conversions between flow messages and service envelopes.
//!
//! Nothing here performs I/O or mutates session state; both directions are
//! deterministic given their inputs.

use crate::client::PubSubEnvelope;
use crate::config::EncodingMode;
use crate::flow::{FlowMessage, FlowPayload};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

/// Attribute key carrying the message timestamp across the wire.
pub const TIMESTAMP_ATTRIBUTE: &str = "timestamp";

/// Builds a publishable envelope from a flow message.
///
/// The payload bytes are carried verbatim; text payloads contribute their
/// UTF-8 bytes. The timestamp attribute is the message time when present,
/// otherwise the current time, rendered as ISO-8601 with millisecond
/// precision in UTC.
pub fn to_envelope(message: &FlowMessage) -> PubSubEnvelope {
    let stamped = message.time.unwrap_or_else(Utc::now);
    let mut attributes = HashMap::new();
    attributes.insert(
        TIMESTAMP_ATTRIBUTE.to_string(),
        stamped.to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    PubSubEnvelope {
        data: Bytes::copy_from_slice(message.payload.as_bytes()),
        attributes,
        ack_token: None,
    }
}

/// Builds a flow message from a delivered envelope.
///
/// Decoding failures are soft: an unparseable timestamp attribute yields
/// `time: None`, and text decoding replaces invalid UTF-8 sequences rather
/// than failing the delivery.
pub fn from_envelope(
    envelope: &PubSubEnvelope,
    topic: &str,
    resource_path: &str,
    encoding: EncodingMode,
) -> FlowMessage {
    let payload = match encoding {
        EncodingMode::Binary => FlowPayload::Binary(envelope.data.clone()),
        EncodingMode::String => {
            FlowPayload::Text(String::from_utf8_lossy(&envelope.data).into_owned())
        }
    };

    let time = envelope
        .attributes
        .get(TIMESTAMP_ATTRIBUTE)
        .and_then(|stamp| DateTime::parse_from_rfc3339(stamp).ok())
        .map(|stamp| stamp.with_timezone(&Utc));

    let (project, subscription) = parse_resource_path(resource_path);

    FlowMessage {
        payload,
        time,
        project,
        topic: Some(topic.to_string()),
        subscription,
        resource: Some(resource_path.to_string()),
    }
}

/// Splits a fully-qualified resource path into project and subscription id.
///
/// The project is the segment following a leading `projects` segment. The
/// subscription id is the final segment when it follows a `subscriptions`
/// segment. Anything else yields `None` for that part.
pub fn parse_resource_path(path: &str) -> (Option<String>, Option<String>) {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();

    let project = match segments.first() {
        Some(&"projects") => segments.get(1).map(|segment| segment.to_string()),
        _ => None,
    };

    let subscription = match segments.len().checked_sub(2).and_then(|i| segments.get(i)) {
        Some(&"subscriptions") => segments.last().map(|segment| segment.to_string()),
        _ => None,
    };

    (project, subscription)
}
