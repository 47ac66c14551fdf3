/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # pubsub-bridge
//!
//! `pubsub-bridge` bridges a message-flow runtime and a cloud pub/sub
//! service: an [`InboundSession`] subscribes on a topic and forwards
//! deliveries into the flow, an [`OutboundSession`] publishes flow messages
//! to a topic. Both share one lifecycle model: resources are provisioned
//! idempotently on connect, in-flight work is tracked so a close can drain,
//! and link state is reported through a [`StatusSink`] as it changes.
//!
//! The service itself stays behind the [`PubSubConnector`] capability
//! traits; transport, wire format and authentication belong to the
//! connector implementation, not to this crate.
//!
//! ## Publishing flow messages
//!
//! ```
//! use std::sync::Arc;
//! use integration_test_utils::{InMemoryPubSub, RecordingErrorSink, RecordingStatusSink};
//! use pubsub_bridge::{Credentials, FlowMessage, FlowPayload, OutboundSession, SessionConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let service = InMemoryPubSub::new();
//!
//! let session = OutboundSession::connect(
//!     service.connector(),
//!     &Credentials::from_json(r#"{"type": "service_account"}"#).unwrap(),
//!     SessionConfig::new("news"),
//!     Arc::new(RecordingErrorSink::default()),
//!     Arc::new(RecordingStatusSink::default()),
//! )
//! .await
//! .unwrap();
//!
//! session
//!     .publish(FlowMessage::new(FlowPayload::Text("breaking".to_string())))
//!     .await;
//!
//! // Closing waits for in-flight publishes to drain.
//! session.close().await;
//! assert_eq!(service.published("news").await.len(), 1);
//! # });
//! ```
//!
//! ## Forwarding deliveries into a flow
//!
//! ```
//! use std::sync::Arc;
//! use integration_test_utils::{
//!     InMemoryPubSub, RecordingErrorSink, RecordingFlowSink, RecordingStatusSink,
//! };
//! use pubsub_bridge::{Credentials, InboundSession, LinkStatus, SessionConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let service = InMemoryPubSub::new();
//! let flow = Arc::new(RecordingFlowSink::default());
//! let status = Arc::new(RecordingStatusSink::default());
//!
//! let session = InboundSession::connect(
//!     service.connector(),
//!     &Credentials::from_json(r#"{"type": "service_account"}"#).unwrap(),
//!     SessionConfig::new("news"),
//!     flow.clone(),
//!     Arc::new(RecordingErrorSink::default()),
//!     status.clone(),
//! )
//! .await
//! .unwrap();
//!
//! service.deliver("news", b"breaking").await;
//! let messages = flow.wait_for_messages(1).await;
//! assert_eq!(messages[0].payload.as_bytes(), b"breaking");
//! assert_eq!(messages[0].topic.as_deref(), Some("news"));
//!
//! // Closing deletes the service-generated subscription and reports the
//! // terminal disconnected label.
//! session.close().await.unwrap();
//! assert_eq!(
//!     status.reports().await,
//!     vec![
//!         LinkStatus::Disconnected,
//!         LinkStatus::Connecting,
//!         LinkStatus::Connected,
//!         LinkStatus::Disconnected,
//!     ],
//! );
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - Capability boundary: [`PubSubConnector`] / [`PubSubClient`] trait
//!   objects the sessions operate on
//! - Control plane: idempotent topic/subscription provisioning
//! - Data plane: the inbound and outbound session lifecycles
//! - Translation: pure flow-message/envelope conversions in [`translate`]
//! - Status: session states mapped onto link labels for the host runtime
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not unconditionally initialize a
//! global subscriber. Binaries/tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.

mod client;
pub use client::{
    AckToken, PubSubClient, PubSubConnector, PubSubEnvelope, ServiceCode, ServiceStatus,
    SubscribeOptions, SubscriptionBinding, SubscriptionEvent, SubscriptionHandle, TopicHandle,
};

mod config;
pub use config::{Credentials, EncodingMode, SessionConfig};

mod control_plane;
mod data_plane;
pub use data_plane::inbound::InboundSession;
pub use data_plane::outbound::OutboundSession;

mod error;
pub use error::{ConfigError, SessionError};

mod flow;
pub use flow::{ErrorSink, FlowMessage, FlowPayload, FlowSink};

#[doc(hidden)]
pub mod observability;

mod status;
pub use status::{LinkStatus, SessionState, StatusReporter, StatusSink};

pub mod translate;
