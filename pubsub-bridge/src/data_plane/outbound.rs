//! Outbound session that publishes flow messages and drains in-flight work
//! on close.

use crate::client::{PubSubConnector, TopicHandle};
use crate::config::{Credentials, SessionConfig};
use crate::control_plane::provisioning::ensure_topic;
use crate::error::{ConfigError, SessionError};
use crate::flow::{ErrorSink, FlowMessage};
use crate::observability::events;
use crate::status::{SessionState, StatusReporter, StatusSink};
use crate::translate;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "outbound_session";

struct OutboundShared {
    /// Publishes issued but not yet completed. Never negative: completions
    /// decrement saturating, so a batched acknowledgement covering several
    /// envelopes cannot underflow it.
    pending: u64,
    /// `None` once the session is closed; publish becomes a no-op then.
    topic: Option<Arc<dyn TopicHandle>>,
    /// Present while a close waits for in-flight publishes to finish.
    drain_waiter: Option<oneshot::Sender<()>>,
}

/// Connected publish session.
///
/// Constructed through [`OutboundSession::connect`]; a value of this type
/// always reached the connected state.
pub struct OutboundSession {
    id: String,
    reporter: Arc<StatusReporter>,
    errors: Arc<dyn ErrorSink>,
    shared: Arc<Mutex<OutboundShared>>,
}

impl OutboundSession {
    /// Validates the configuration, connects and provisions the topic.
    ///
    /// Reports `disconnected` on entry, `connecting` through client connect
    /// and topic provisioning, and `connected` once ready. Failures report
    /// `disconnected` and surface once; there is no automatic retry.
    pub async fn connect(
        connector: Arc<dyn PubSubConnector>,
        credentials: &Credentials,
        config: SessionConfig,
        errors: Arc<dyn ErrorSink>,
        status: Arc<dyn StatusSink>,
    ) -> Result<Self, SessionError> {
        let id = Uuid::new_v4().to_string();
        let reporter = Arc::new(StatusReporter::new(status));
        reporter.transition(SessionState::Disconnected).await;

        config.validate()?;
        if credentials.is_missing() {
            return Err(ConfigError::MissingCredentials.into());
        }

        reporter.transition(SessionState::Connecting).await;
        let client = match connector.connect(credentials).await {
            Ok(client) => client,
            Err(status) => {
                reporter.transition(SessionState::Disconnected).await;
                return Err(SessionError::Connect(status));
            }
        };

        reporter.transition(SessionState::Provisioning).await;
        let topic = match ensure_topic(&client, &config.topic).await {
            Ok(topic) => topic,
            Err(status) => {
                reporter.transition(SessionState::Disconnected).await;
                return Err(SessionError::Provision(status));
            }
        };

        reporter.transition(SessionState::Connected).await;
        debug!(
            event = events::OUTBOUND_CONNECT,
            component = COMPONENT,
            session = %id,
            topic = %config.topic,
            "outbound session connected"
        );

        Ok(Self {
            id,
            reporter,
            errors,
            shared: Arc::new(Mutex::new(OutboundShared {
                pending: 0,
                topic: Some(topic),
                drain_waiter: None,
            })),
        })
    }

    /// Publishes one flow message.
    ///
    /// Empty payloads and publishes after close are silent no-ops. The
    /// publish itself completes in the background: `publishing` is reported
    /// while work is in flight, `connected` when the last completion brings
    /// the pending count back to zero. A failed publish is reported through
    /// the error sink and does not stop later publishes.
    pub async fn publish(&self, message: FlowMessage) {
        if message.payload.is_empty() {
            debug!(
                event = events::OUTBOUND_PUBLISH_SKIPPED_EMPTY,
                component = COMPONENT,
                session = %self.id,
                "skipping publish of empty payload"
            );
            return;
        }

        let topic = {
            let mut shared = self.shared.lock().await;
            let topic = match shared.topic.as_ref() {
                Some(topic) => topic.clone(),
                None => return,
            };
            shared.pending += 1;
            if shared.pending == 1 {
                self.reporter.transition(SessionState::Publishing).await;
            }
            topic
        };

        let envelope = translate::to_envelope(&message);
        debug!(
            event = events::OUTBOUND_PUBLISH,
            component = COMPONENT,
            session = %self.id,
            topic = %topic.name(),
            bytes = envelope.data.len(),
            "publishing message"
        );

        let id = self.id.clone();
        let errors = self.errors.clone();
        let reporter = self.reporter.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let outcome = topic.publish(envelope).await;
            let completed = match &outcome {
                Ok(message_ids) => message_ids.len().max(1) as u64,
                Err(_) => 1,
            };

            let mut shared = shared.lock().await;
            shared.pending = shared.pending.saturating_sub(completed);

            if let Err(status) = outcome {
                warn!(
                    event = events::OUTBOUND_PUBLISH_FAILED,
                    component = COMPONENT,
                    session = %id,
                    err = %status,
                    "publish failed"
                );
                errors.report_error(SessionError::Delivery(status)).await;
            }

            if shared.pending == 0 {
                if let Some(waiter) = shared.drain_waiter.take() {
                    debug!(
                        event = events::OUTBOUND_DRAINED,
                        component = COMPONENT,
                        session = %id,
                        "in-flight publishes drained, completing close"
                    );
                    reporter.transition(SessionState::Connected).await;
                    reporter.transition(SessionState::Disconnected).await;
                    let _ = waiter.send(());
                } else if shared.topic.is_some() {
                    reporter.transition(SessionState::Connected).await;
                }
            }
        });
    }

    /// Stops accepting publishes and waits for in-flight ones to complete.
    ///
    /// With nothing in flight the close reports `disconnected` and returns
    /// immediately. Otherwise it parks until the last completion drains the
    /// pending count to zero; already-issued publishes still complete and
    /// their failures are still reported. Closing twice is a no-op.
    pub async fn close(&self) {
        debug!(
            event = events::OUTBOUND_CLOSE,
            component = COMPONENT,
            session = %self.id,
            "closing outbound session"
        );

        let drained = {
            let mut shared = self.shared.lock().await;
            if shared.topic.take().is_none() {
                return;
            }
            if shared.pending == 0 {
                self.reporter.transition(SessionState::Disconnected).await;
                return;
            }
            let (sender, receiver) = oneshot::channel();
            shared.drain_waiter = Some(sender);
            receiver
        };

        let _ = drained.await;
    }
}

#[cfg(test)]
mod tests {
    use super::OutboundSession;
    use crate::client::{
        PubSubClient, PubSubConnector, PubSubEnvelope, ServiceCode, ServiceStatus,
        SubscribeOptions, SubscriptionBinding, TopicHandle,
    };
    use crate::config::{Credentials, SessionConfig};
    use crate::error::SessionError;
    use crate::flow::{ErrorSink, FlowMessage, FlowPayload};
    use crate::status::{LinkStatus, StatusSink};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::sync::{Mutex, Semaphore};

    #[derive(Default)]
    struct RecordingStatusSink {
        reports: Mutex<Vec<LinkStatus>>,
    }

    #[async_trait]
    impl StatusSink for RecordingStatusSink {
        async fn report(&self, status: LinkStatus) {
            self.reports.lock().await.push(status);
        }
    }

    #[derive(Default)]
    struct RecordingErrorSink {
        errors: Mutex<Vec<SessionError>>,
    }

    #[async_trait]
    impl ErrorSink for RecordingErrorSink {
        async fn report_error(&self, error: SessionError) {
            self.errors.lock().await.push(error);
        }
    }

    /// Topic whose publishes block until a completion permit is released.
    struct GatedTopic {
        publish_calls: AtomicUsize,
        completions: Semaphore,
        scripted_results: StdMutex<VecDeque<Result<Vec<String>, ServiceStatus>>>,
    }

    impl GatedTopic {
        fn new() -> Self {
            Self {
                publish_calls: AtomicUsize::new(0),
                completions: Semaphore::new(0),
                scripted_results: StdMutex::new(VecDeque::new()),
            }
        }

        fn release_completions(&self, count: usize) {
            self.completions.add_permits(count);
        }

        fn script_result(&self, result: Result<Vec<String>, ServiceStatus>) {
            self.scripted_results
                .lock()
                .expect("lock scripted_results")
                .push_back(result);
        }
    }

    #[async_trait]
    impl TopicHandle for GatedTopic {
        fn name(&self) -> &str {
            "news"
        }

        async fn publish(&self, _envelope: PubSubEnvelope) -> Result<Vec<String>, ServiceStatus> {
            let call = self.publish_calls.fetch_add(1, Ordering::SeqCst);
            let permit = self
                .completions
                .acquire()
                .await
                .expect("completions semaphore open");
            permit.forget();

            self.scripted_results
                .lock()
                .expect("lock scripted_results")
                .pop_front()
                .unwrap_or_else(|| Ok(vec![format!("id-{call}")]))
        }

        async fn subscribe(
            &self,
            _name: Option<&str>,
            _options: &SubscribeOptions,
        ) -> Result<SubscriptionBinding, ServiceStatus> {
            Err(ServiceStatus::fail_with_code(
                ServiceCode::Unimplemented,
                "not used in tests",
            ))
        }
    }

    struct GatedClient {
        topic: Arc<GatedTopic>,
    }

    #[async_trait]
    impl PubSubClient for GatedClient {
        async fn topic(
            &self,
            _name: &str,
            _auto_create: bool,
        ) -> Result<Arc<dyn TopicHandle>, ServiceStatus> {
            Ok(self.topic.clone())
        }
    }

    struct GatedConnector {
        client: Arc<GatedClient>,
    }

    #[async_trait]
    impl PubSubConnector for GatedConnector {
        async fn connect(
            &self,
            _credentials: &Credentials,
        ) -> Result<Arc<dyn PubSubClient>, ServiceStatus> {
            Ok(self.client.clone())
        }
    }

    struct Fixture {
        topic: Arc<GatedTopic>,
        status: Arc<RecordingStatusSink>,
        errors: Arc<RecordingErrorSink>,
    }

    async fn connected_session(fixture: &Fixture) -> OutboundSession {
        let connector = Arc::new(GatedConnector {
            client: Arc::new(GatedClient {
                topic: fixture.topic.clone(),
            }),
        });
        OutboundSession::connect(
            connector,
            &Credentials::from_json(r#"{"type": "service_account"}"#).expect("valid credentials"),
            SessionConfig::new("news"),
            fixture.errors.clone(),
            fixture.status.clone(),
        )
        .await
        .expect("session connects")
    }

    fn fixture() -> Fixture {
        Fixture {
            topic: Arc::new(GatedTopic::new()),
            status: Arc::new(RecordingStatusSink::default()),
            errors: Arc::new(RecordingErrorSink::default()),
        }
    }

    fn text_message(text: &str) -> FlowMessage {
        FlowMessage::new(FlowPayload::Text(text.to_string()))
    }

    async fn wait_until<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn empty_payload_publish_is_a_complete_no_op() {
        let fixture = fixture();
        let session = connected_session(&fixture).await;

        session.publish(text_message("")).await;
        session
            .publish(FlowMessage::new(FlowPayload::Binary(Bytes::new())))
            .await;

        assert_eq!(fixture.topic.publish_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            fixture.status.reports.lock().await.clone(),
            vec![
                LinkStatus::Disconnected,
                LinkStatus::Connecting,
                LinkStatus::Connected,
            ]
        );
        session.close().await;
    }

    #[tokio::test]
    async fn publish_after_close_is_a_no_op() {
        let fixture = fixture();
        let session = connected_session(&fixture).await;

        session.close().await;
        session.publish(text_message("late")).await;

        assert_eq!(fixture.topic.publish_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            fixture.status.reports.lock().await.clone(),
            vec![
                LinkStatus::Disconnected,
                LinkStatus::Connecting,
                LinkStatus::Connected,
                LinkStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn publishing_is_reported_while_work_is_in_flight() {
        let fixture = fixture();
        let session = connected_session(&fixture).await;

        session.publish(text_message("one")).await;
        assert_eq!(
            fixture.status.reports.lock().await.last().copied(),
            Some(LinkStatus::Publishing)
        );

        fixture.topic.release_completions(1);
        let status = fixture.status.clone();
        wait_until(|| {
            status
                .reports
                .try_lock()
                .map(|reports| reports.last().copied() == Some(LinkStatus::Connected))
                .unwrap_or(false)
        })
        .await;
        session.close().await;
    }

    #[tokio::test]
    async fn close_parks_until_in_flight_publishes_drain() {
        let fixture = fixture();
        let session = Arc::new(connected_session(&fixture).await);

        session.publish(text_message("one")).await;
        session.publish(text_message("two")).await;

        let closing = {
            let session = session.clone();
            tokio::spawn(async move { session.close().await })
        };

        // The close cannot complete while both publishes are outstanding.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closing.is_finished());

        fixture.topic.release_completions(2);
        closing.await.expect("close task completes");

        assert_eq!(fixture.topic.publish_calls.load(Ordering::SeqCst), 2);
        let reports = fixture.status.reports.lock().await.clone();
        assert_eq!(reports.last().copied(), Some(LinkStatus::Disconnected));
        assert!(reports.contains(&LinkStatus::Publishing));
    }

    #[tokio::test]
    async fn failed_publish_reports_the_error_and_keeps_the_session_usable() {
        let fixture = fixture();
        let session = connected_session(&fixture).await;

        fixture.topic.script_result(Err(ServiceStatus::fail_with_code(
            ServiceCode::Unavailable,
            "backend down",
        )));
        session.publish(text_message("doomed")).await;
        fixture.topic.release_completions(1);

        let errors = fixture.errors.clone();
        wait_until(|| {
            errors
                .errors
                .try_lock()
                .map(|errors| errors.len() == 1)
                .unwrap_or(false)
        })
        .await;
        assert!(matches!(
            fixture.errors.errors.lock().await[0],
            SessionError::Delivery(_)
        ));

        session.publish(text_message("retry")).await;
        fixture.topic.release_completions(1);
        let status = fixture.status.clone();
        wait_until(|| {
            status
                .reports
                .try_lock()
                .map(|reports| reports.last().copied() == Some(LinkStatus::Connected))
                .unwrap_or(false)
        })
        .await;
        assert_eq!(fixture.topic.publish_calls.load(Ordering::SeqCst), 2);
        session.close().await;
    }
}
