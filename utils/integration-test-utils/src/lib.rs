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

//! Test support shared by the `pubsub-bridge` integration tests and
//! doctests.
//!
//! [`InMemoryPubSub`] is a scriptable stand-in for the cloud service behind
//! the capability traits: it keeps topics and subscriptions in process,
//! fans published envelopes out to live subscriptions, journals every
//! publish, acknowledgement and deletion, and lets a test enqueue failures
//! for the next connect, topic, subscribe, publish or delete call. The
//! recording sinks capture what a session hands across the flow, error and
//! status boundaries.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use pubsub_bridge::{
    AckToken, Credentials, ErrorSink, FlowMessage, FlowSink, LinkStatus, PubSubClient,
    PubSubConnector, PubSubEnvelope, ServiceStatus, SessionError, StatusSink, SubscribeOptions,
    SubscriptionBinding, SubscriptionEvent, SubscriptionHandle, TopicHandle,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Once};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::sync::{Mutex, Semaphore};
use tracing::debug;
use uuid::Uuid;

const PROJECT: &str = "in-memory";

const WAIT_ATTEMPTS: usize = 500;
const WAIT_STEP: Duration = Duration::from_millis(10);

/// Initializes the process-wide `tracing` subscriber once. Safe to call
/// from every test; later calls are no-ops.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    });
}

/// Credential material accepted by [`InMemoryPubSub`].
pub fn service_account_credentials() -> Credentials {
    let material = serde_json::json!({
        "type": "service_account",
        "project_id": PROJECT,
    });
    Credentials::from_json(&material.to_string()).expect("credential json is valid")
}

struct TopicState {
    name: String,
    published: Mutex<Vec<PubSubEnvelope>>,
    subscriptions: Mutex<HashMap<String, Sender<SubscriptionEvent>>>,
    subscribe_calls: Mutex<Vec<(Option<String>, SubscribeOptions)>>,
}

impl TopicState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
            subscribe_calls: Mutex::new(Vec::new()),
        }
    }

    async fn fan_out(&self, envelope: &PubSubEnvelope) {
        for sender in self.subscriptions.lock().await.values() {
            let mut delivery = envelope.clone();
            delivery.ack_token = Some(AckToken::new(Uuid::new_v4().to_string()));
            let _ = sender.send(SubscriptionEvent::Message(delivery)).await;
        }
    }
}

#[derive(Default)]
struct FailureScript {
    connect: StdMutex<VecDeque<ServiceStatus>>,
    topic: StdMutex<VecDeque<ServiceStatus>>,
    subscribe: StdMutex<VecDeque<ServiceStatus>>,
    publish: StdMutex<VecDeque<ServiceStatus>>,
    delete: StdMutex<VecDeque<ServiceStatus>>,
}

fn push_scripted(queue: &StdMutex<VecDeque<ServiceStatus>>, status: ServiceStatus) {
    queue.lock().expect("failure script lock").push_back(status);
}

fn pop_scripted(queue: &StdMutex<VecDeque<ServiceStatus>>) -> Option<ServiceStatus> {
    queue.lock().expect("failure script lock").pop_front()
}

struct ServiceState {
    topics: Mutex<HashMap<String, Arc<TopicState>>>,
    failures: FailureScript,
    scripted_message_ids: StdMutex<VecDeque<Vec<String>>>,
    topic_calls: StdMutex<Vec<(String, bool)>>,
    acked: StdMutex<Vec<String>>,
    deleted: StdMutex<Vec<String>>,
    publishes_gated: AtomicBool,
    publish_gate: Semaphore,
}

impl ServiceState {
    async fn topic_state(&self, name: &str) -> Arc<TopicState> {
        self.topics
            .lock()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(TopicState::new(name)))
            .clone()
    }
}

/// In-process pub/sub service for tests.
///
/// The fake treats topic lookup as get-or-create regardless of the
/// `auto_create` flag; error paths are driven by the scripted failure
/// queues instead of real resource absence.
pub struct InMemoryPubSub {
    state: Arc<ServiceState>,
}

impl InMemoryPubSub {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            state: Arc::new(ServiceState {
                topics: Mutex::new(HashMap::new()),
                failures: FailureScript::default(),
                scripted_message_ids: StdMutex::new(VecDeque::new()),
                topic_calls: StdMutex::new(Vec::new()),
                acked: StdMutex::new(Vec::new()),
                deleted: StdMutex::new(Vec::new()),
                publishes_gated: AtomicBool::new(false),
                publish_gate: Semaphore::new(0),
            }),
        }
    }

    /// Connector handle to hand to a session under test.
    pub fn connector(&self) -> Arc<dyn PubSubConnector> {
        Arc::new(InMemoryConnector {
            state: self.state.clone(),
        })
    }

    /// Delivers a payload to every live subscription on the topic, stamped
    /// with a current-time `timestamp` attribute the way the real service
    /// would.
    pub async fn deliver(&self, topic: &str, payload: &[u8]) {
        let mut envelope = PubSubEnvelope {
            data: Bytes::copy_from_slice(payload),
            ..Default::default()
        };
        envelope.attributes.insert(
            "timestamp".to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        self.deliver_envelope(topic, envelope).await;
    }

    /// Delivers a fully caller-built envelope to every live subscription on
    /// the topic.
    pub async fn deliver_envelope(&self, topic: &str, envelope: PubSubEnvelope) {
        debug!(topic, bytes = envelope.data.len(), "delivering test envelope");
        self.state.topic_state(topic).await.fan_out(&envelope).await;
    }

    /// Fails every live subscription stream on the topic with the given
    /// status.
    pub async fn break_stream(&self, topic: &str, status: ServiceStatus) {
        let topic = self.state.topic_state(topic).await;
        for sender in topic.subscriptions.lock().await.values() {
            let _ = sender
                .send(SubscriptionEvent::StreamError(status.clone()))
                .await;
        }
    }

    /// Envelopes published on the topic, in publish order.
    pub async fn published(&self, topic: &str) -> Vec<PubSubEnvelope> {
        self.state
            .topic_state(topic)
            .await
            .published
            .lock()
            .await
            .clone()
    }

    /// `(name, options)` pairs of every subscribe call observed on the
    /// topic.
    pub async fn subscribe_calls(&self, topic: &str) -> Vec<(Option<String>, SubscribeOptions)> {
        self.state
            .topic_state(topic)
            .await
            .subscribe_calls
            .lock()
            .await
            .clone()
    }

    /// Ack token ids acknowledged so far, in acknowledgement order.
    pub fn acked(&self) -> Vec<String> {
        self.state.acked.lock().expect("acked lock").clone()
    }

    /// Resource paths of subscriptions deleted so far, including failed
    /// delete attempts.
    pub fn deleted_subscriptions(&self) -> Vec<String> {
        self.state.deleted.lock().expect("deleted lock").clone()
    }

    /// `(name, auto_create)` pairs of every topic call observed.
    pub fn topic_calls(&self) -> Vec<(String, bool)> {
        self.state.topic_calls.lock().expect("topic_calls lock").clone()
    }

    pub fn fail_next_connect(&self, status: ServiceStatus) {
        push_scripted(&self.state.failures.connect, status);
    }

    pub fn fail_next_topic(&self, status: ServiceStatus) {
        push_scripted(&self.state.failures.topic, status);
    }

    pub fn fail_next_subscribe(&self, status: ServiceStatus) {
        push_scripted(&self.state.failures.subscribe, status);
    }

    pub fn fail_next_publish(&self, status: ServiceStatus) {
        push_scripted(&self.state.failures.publish, status);
    }

    pub fn fail_next_delete(&self, status: ServiceStatus) {
        push_scripted(&self.state.failures.delete, status);
    }

    /// Scripts the message ids returned by the next successful publish,
    /// standing in for a batching service that acknowledges several
    /// envelopes with one response.
    pub fn script_message_ids(&self, ids: Vec<String>) {
        self.state
            .scripted_message_ids
            .lock()
            .expect("scripted_message_ids lock")
            .push_back(ids);
    }

    /// Holds every subsequent publish until a permit is released through
    /// [`InMemoryPubSub::release_publishes`].
    pub fn gate_publishes(&self) {
        self.state.publishes_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_publishes(&self, count: usize) {
        self.state.publish_gate.add_permits(count);
    }
}

struct InMemoryConnector {
    state: Arc<ServiceState>,
}

#[async_trait]
impl PubSubConnector for InMemoryConnector {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn PubSubClient>, ServiceStatus> {
        if let Some(status) = pop_scripted(&self.state.failures.connect) {
            return Err(status);
        }
        Ok(Arc::new(InMemoryClient {
            state: self.state.clone(),
        }))
    }
}

struct InMemoryClient {
    state: Arc<ServiceState>,
}

#[async_trait]
impl PubSubClient for InMemoryClient {
    async fn topic(
        &self,
        name: &str,
        auto_create: bool,
    ) -> Result<Arc<dyn TopicHandle>, ServiceStatus> {
        self.state
            .topic_calls
            .lock()
            .expect("topic_calls lock")
            .push((name.to_string(), auto_create));

        if let Some(status) = pop_scripted(&self.state.failures.topic) {
            return Err(status);
        }

        Ok(Arc::new(InMemoryTopic {
            state: self.state.clone(),
            topic: self.state.topic_state(name).await,
        }))
    }
}

struct InMemoryTopic {
    state: Arc<ServiceState>,
    topic: Arc<TopicState>,
}

#[async_trait]
impl TopicHandle for InMemoryTopic {
    fn name(&self) -> &str {
        &self.topic.name
    }

    async fn publish(&self, envelope: PubSubEnvelope) -> Result<Vec<String>, ServiceStatus> {
        if self.state.publishes_gated.load(Ordering::SeqCst) {
            let permit = self
                .state
                .publish_gate
                .acquire()
                .await
                .expect("publish gate open");
            permit.forget();
        }

        if let Some(status) = pop_scripted(&self.state.failures.publish) {
            return Err(status);
        }

        self.topic.published.lock().await.push(envelope.clone());
        self.topic.fan_out(&envelope).await;

        let ids = self
            .state
            .scripted_message_ids
            .lock()
            .expect("scripted_message_ids lock")
            .pop_front()
            .unwrap_or_else(|| vec![Uuid::new_v4().to_string()]);
        Ok(ids)
    }

    async fn subscribe(
        &self,
        name: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<SubscriptionBinding, ServiceStatus> {
        self.topic
            .subscribe_calls
            .lock()
            .await
            .push((name.map(str::to_string), options.clone()));

        if let Some(status) = pop_scripted(&self.state.failures.subscribe) {
            return Err(status);
        }

        let subscription_name = match name {
            Some(name) => name.to_string(),
            None => format!("generated-{}", Uuid::new_v4()),
        };
        let (sender, receiver) = tokio::sync::mpsc::channel(16);
        self.topic
            .subscriptions
            .lock()
            .await
            .insert(subscription_name.clone(), sender);

        Ok(SubscriptionBinding {
            subscription: Arc::new(InMemorySubscription {
                path: format!(
                    "projects/{PROJECT}/topics/{}/subscriptions/{subscription_name}",
                    self.topic.name
                ),
                name: subscription_name,
                state: self.state.clone(),
                topic: self.topic.clone(),
            }),
            events: receiver,
        })
    }
}

struct InMemorySubscription {
    path: String,
    name: String,
    state: Arc<ServiceState>,
    topic: Arc<TopicState>,
}

#[async_trait]
impl SubscriptionHandle for InMemorySubscription {
    fn resource_path(&self) -> &str {
        &self.path
    }

    async fn ack(&self, token: &AckToken) -> Result<(), ServiceStatus> {
        self.state
            .acked
            .lock()
            .expect("acked lock")
            .push(token.id().to_string());
        Ok(())
    }

    async fn delete(&self) -> Result<(), ServiceStatus> {
        self.state
            .deleted
            .lock()
            .expect("deleted lock")
            .push(self.path.clone());
        if let Some(status) = pop_scripted(&self.state.failures.delete) {
            return Err(status);
        }
        self.topic.subscriptions.lock().await.remove(&self.name);
        Ok(())
    }
}

/// Status sink recording the label sequence a session reports.
#[derive(Default)]
pub struct RecordingStatusSink {
    reports: Mutex<Vec<LinkStatus>>,
}

impl RecordingStatusSink {
    pub async fn reports(&self) -> Vec<LinkStatus> {
        self.reports.lock().await.clone()
    }

    /// Parks until the most recently reported label equals `status`.
    pub async fn wait_for(&self, status: LinkStatus) {
        for _ in 0..WAIT_ATTEMPTS {
            if self.reports.lock().await.last() == Some(&status) {
                return;
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
        panic!(
            "status {status} not reported in time, saw {:?}",
            self.reports.lock().await
        );
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn report(&self, status: LinkStatus) {
        self.reports.lock().await.push(status);
    }
}

/// Error sink recording every session error reported.
#[derive(Default)]
pub struct RecordingErrorSink {
    errors: Mutex<Vec<SessionError>>,
}

impl RecordingErrorSink {
    pub async fn errors(&self) -> Vec<SessionError> {
        self.errors.lock().await.clone()
    }

    /// Parks until at least `count` errors have been reported.
    pub async fn wait_for_errors(&self, count: usize) -> Vec<SessionError> {
        for _ in 0..WAIT_ATTEMPTS {
            {
                let errors = self.errors.lock().await;
                if errors.len() >= count {
                    return errors.clone();
                }
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
        panic!("{count} errors not reported in time");
    }
}

#[async_trait]
impl ErrorSink for RecordingErrorSink {
    async fn report_error(&self, error: SessionError) {
        self.errors.lock().await.push(error);
    }
}

/// Flow sink recording every message forwarded into the flow runtime.
#[derive(Default)]
pub struct RecordingFlowSink {
    messages: Mutex<Vec<FlowMessage>>,
}

impl RecordingFlowSink {
    pub async fn messages(&self) -> Vec<FlowMessage> {
        self.messages.lock().await.clone()
    }

    /// Parks until at least `count` messages have been forwarded.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<FlowMessage> {
        for _ in 0..WAIT_ATTEMPTS {
            {
                let messages = self.messages.lock().await;
                if messages.len() >= count {
                    return messages.clone();
                }
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
        panic!("{count} messages not forwarded in time");
    }
}

#[async_trait]
impl FlowSink for RecordingFlowSink {
    async fn deliver(&self, message: FlowMessage) {
        self.messages.lock().await.push(message);
    }
}
