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

//! Control-plane layer.
//!
//! Owns resource provisioning: resolving topic handles and binding
//! subscriptions so that concurrent create-if-missing races converge on the
//! surviving resource instead of surfacing as errors.
//!
//! ```
//! use std::sync::Arc;
//! use integration_test_utils::{InMemoryPubSub, RecordingErrorSink, RecordingStatusSink};
//! use pubsub_bridge::{Credentials, OutboundSession, ServiceCode, ServiceStatus, SessionConfig};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let service = InMemoryPubSub::new();
//! service.fail_next_topic(ServiceStatus::fail_with_code(
//!     ServiceCode::AlreadyExists,
//!     "created concurrently",
//! ));
//!
//! // A creation conflict is absorbed by re-fetching the existing topic.
//! let session = OutboundSession::connect(
//!     service.connector(),
//!     &Credentials::from_json(r#"{"type": "service_account"}"#).unwrap(),
//!     SessionConfig::new("news"),
//!     Arc::new(RecordingErrorSink::default()),
//!     Arc::new(RecordingStatusSink::default()),
//! )
//! .await
//! .unwrap();
//! session.close().await;
//! # });
//! ```

pub(crate) mod provisioning;
