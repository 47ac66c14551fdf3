//! Flow-runtime boundary: messages handed across it and the sinks that
//! receive them.

use crate::error::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Payload of a flow message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowPayload {
    Binary(Bytes),
    Text(String),
}

impl FlowPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            FlowPayload::Binary(data) => data.is_empty(),
            FlowPayload::Text(text) => text.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FlowPayload::Binary(data) => data,
            FlowPayload::Text(text) => text.as_bytes(),
        }
    }
}

/// Message exchanged with the flow runtime.
///
/// The provenance fields are populated on inbound deliveries only;
/// messages built by the flow for publishing carry `None` there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMessage {
    pub payload: FlowPayload,
    pub time: Option<DateTime<Utc>>,
    pub project: Option<String>,
    pub topic: Option<String>,
    pub subscription: Option<String>,
    pub resource: Option<String>,
}

impl FlowMessage {
    pub fn new(payload: FlowPayload) -> Self {
        Self {
            payload,
            time: None,
            project: None,
            topic: None,
            subscription: None,
            resource: None,
        }
    }
}

/// Downstream handoff into the flow runtime.
#[async_trait]
pub trait FlowSink: Send + Sync {
    async fn deliver(&self, message: FlowMessage);
}

/// Error channel of the flow runtime.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn report_error(&self, error: SessionError);
}
