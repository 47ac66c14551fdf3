/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Data-plane layer.
//!
//! Owns the two session kinds and their lifecycles: the inbound session
//! subscribing on a topic and forwarding deliveries into the flow runtime,
//! and the outbound session publishing flow messages while tracking
//! in-flight work so a close can drain.
//!
//! ```
//! use std::sync::Arc;
//! use integration_test_utils::{
//!     InMemoryPubSub, RecordingErrorSink, RecordingFlowSink, RecordingStatusSink,
//! };
//! use pubsub_bridge::{Credentials, InboundSession, SessionConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let service = InMemoryPubSub::new();
//! let flow = Arc::new(RecordingFlowSink::default());
//!
//! let session = InboundSession::connect(
//!     service.connector(),
//!     &Credentials::from_json(r#"{"type": "service_account"}"#).unwrap(),
//!     SessionConfig::new("news"),
//!     flow.clone(),
//!     Arc::new(RecordingErrorSink::default()),
//!     Arc::new(RecordingStatusSink::default()),
//! )
//! .await
//! .unwrap();
//!
//! // Deliveries are forwarded into the flow sink, then acknowledged.
//! service.deliver("news", b"breaking").await;
//! flow.wait_for_messages(1).await;
//!
//! // Closing deletes the service-generated subscription.
//! session.close().await.unwrap();
//! # });
//! ```

pub(crate) mod inbound;
pub(crate) mod outbound;
