//! Capability-side contract for the cloud pub/sub service.
//!
//! The bridge never talks to the network itself. Sessions operate on the
//! trait objects below and stay agnostic of transport, auth and wire
//! details, which belong to the connector implementation.

use crate::config::{Credentials, EncodingMode};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

/// gRPC-style status code carried by [`ServiceStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// Failure detail reported by the service capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub code: ServiceCode,
    pub message: String,
}

impl ServiceStatus {
    pub fn fail_with_code(code: ServiceCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this status reports a benign creation race on an existing
    /// resource.
    pub fn is_conflict(&self) -> bool {
        self.code == ServiceCode::AlreadyExists
    }
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ServiceStatus {}

/// Opaque delivery handle used to acknowledge exactly one received envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckToken(String);

impl AckToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// Wire envelope exchanged with the service.
///
/// `ack_token` is only populated on envelopes delivered by a subscription;
/// envelopes built for publishing carry `None`.
#[derive(Debug, Clone, Default)]
pub struct PubSubEnvelope {
    pub data: bytes::Bytes,
    pub attributes: HashMap<String, String>,
    pub ack_token: Option<AckToken>,
}

/// Event emitted by a live subscription stream.
#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    Message(PubSubEnvelope),
    StreamError(ServiceStatus),
}

/// Subscription tuning passed through to the service.
///
/// Every field is optional on purpose: an unset field is not forwarded, so
/// the service applies its own defaults rather than ours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub ack_deadline: Option<Duration>,
    pub encoding: Option<EncodingMode>,
    pub poll_interval: Option<Duration>,
    pub timeout: Option<Duration>,
}

/// Live subscription returned by [`TopicHandle::subscribe`].
///
/// Ownership of `events` transfers to the session for its connected
/// lifetime. Detaching from the stream is ceasing to consume it and
/// releasing the handle.
pub struct SubscriptionBinding {
    pub subscription: Arc<dyn SubscriptionHandle>,
    pub events: Receiver<SubscriptionEvent>,
}

/// Entry point owned by the host runtime: authenticates and yields a client.
#[async_trait]
pub trait PubSubConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn PubSubClient>, ServiceStatus>;
}

/// Authenticated service client.
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Resolves a topic handle. With `auto_create` the service creates the
    /// topic when absent; without it the call is a plain lookup.
    async fn topic(
        &self,
        name: &str,
        auto_create: bool,
    ) -> Result<Arc<dyn TopicHandle>, ServiceStatus>;
}

/// Handle on one topic.
#[async_trait]
pub trait TopicHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Publishes one envelope and resolves to the message ids the service
    /// assigned. A batching service may acknowledge several envelopes with
    /// one response.
    async fn publish(&self, envelope: PubSubEnvelope) -> Result<Vec<String>, ServiceStatus>;

    /// Binds a subscription on this topic and hands back its event stream.
    ///
    /// A named subscription is created when absent and rebound when it
    /// already exists. `None` asks the service to generate an ephemeral
    /// subscription name.
    async fn subscribe(
        &self,
        name: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionBinding, ServiceStatus>;
}

/// Handle on one bound subscription.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    /// Fully-qualified resource path of the subscription.
    fn resource_path(&self) -> &str;

    async fn ack(&self, token: &AckToken) -> Result<(), ServiceStatus>;

    async fn delete(&self) -> Result<(), ServiceStatus>;
}
