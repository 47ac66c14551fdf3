//! Inbound session that subscribes on a topic and forwards deliveries into
//! the flow runtime.

use crate::client::{PubSubConnector, SubscriptionEvent, SubscriptionHandle};
use crate::config::{Credentials, EncodingMode, SessionConfig};
use crate::control_plane::provisioning::{ensure_subscription, ensure_topic};
use crate::error::{ConfigError, SessionError};
use crate::flow::{ErrorSink, FlowSink};
use crate::observability::{events, fields};
use crate::status::{SessionState, StatusReporter, StatusSink};
use crate::translate;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

const COMPONENT: &str = "inbound_session";

struct InboundResources {
    subscription: Arc<dyn SubscriptionHandle>,
    autogenerated: bool,
    receive_task: JoinHandle<()>,
}

/// Connected subscribe-and-forward session.
///
/// Constructed through [`InboundSession::connect`]; a value of this type
/// always reached the connected state. Dropping the session without calling
/// [`InboundSession::close`] leaves the service-side subscription bound.
pub struct InboundSession {
    id: String,
    reporter: Arc<StatusReporter>,
    resources: Mutex<Option<InboundResources>>,
}

impl InboundSession {
    /// Validates the configuration, connects, provisions the topic and
    /// subscription, and starts forwarding deliveries into `flow`.
    ///
    /// Status labels are reported along the way: `disconnected` on entry,
    /// `connecting` while the client connects and resources are
    /// provisioned, `connected` once the receive loop runs. Configuration
    /// problems fail before anything is reported as connecting. Connect and
    /// provisioning failures report `disconnected` and surface once; there
    /// is no automatic retry, recreating the session is the supervisor's
    /// call.
    pub async fn connect(
        connector: Arc<dyn PubSubConnector>,
        credentials: &Credentials,
        config: SessionConfig,
        flow: Arc<dyn FlowSink>,
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

        let options = config.subscribe_options();
        let (binding, autogenerated) =
            match ensure_subscription(&topic, config.subscription_name(), &options).await {
                Ok(bound) => bound,
                Err(status) => {
                    reporter.transition(SessionState::Disconnected).await;
                    return Err(SessionError::Provision(status));
                }
            };

        reporter.transition(SessionState::Receiving).await;
        debug!(
            event = events::INBOUND_CONNECT,
            component = COMPONENT,
            session = %id,
            topic = %config.topic,
            subscription = %binding.subscription.resource_path(),
            autogenerated,
            "inbound session connected"
        );

        let receive_task = tokio::spawn(Self::receive_loop(
            id.clone(),
            binding.events,
            binding.subscription.clone(),
            config.topic.clone(),
            config.decode_encoding(),
            flow,
            errors,
            reporter.clone(),
        ));

        Ok(Self {
            id,
            reporter,
            resources: Mutex::new(Some(InboundResources {
                subscription: binding.subscription,
                autogenerated,
                receive_task,
            })),
        })
    }

    /// Forwards each delivered envelope into the flow sink and acknowledges
    /// it afterwards. Acknowledging strictly after the handoff keeps the
    /// at-least-once contract: a crash in between causes redelivery, never
    /// loss.
    #[allow(clippy::too_many_arguments)]
    async fn receive_loop(
        id: String,
        mut events_rx: Receiver<SubscriptionEvent>,
        subscription: Arc<dyn SubscriptionHandle>,
        topic: String,
        encoding: EncodingMode,
        flow: Arc<dyn FlowSink>,
        errors: Arc<dyn ErrorSink>,
        reporter: Arc<StatusReporter>,
    ) {
        while let Some(event) = events_rx.recv().await {
            match event {
                SubscriptionEvent::Message(envelope) => {
                    debug!(
                        event = events::INBOUND_FORWARD,
                        component = COMPONENT,
                        session = %id,
                        ack_token = %fields::format_ack_token(&envelope),
                        bytes = envelope.data.len(),
                        "forwarding delivery into the flow"
                    );

                    let message = translate::from_envelope(
                        &envelope,
                        &topic,
                        subscription.resource_path(),
                        encoding,
                    );
                    flow.deliver(message).await;

                    if let Some(token) = envelope.ack_token {
                        if let Err(status) = subscription.ack(&token).await {
                            warn!(
                                event = events::INBOUND_ACK_FAILED,
                                component = COMPONENT,
                                session = %id,
                                ack_token = %token.id(),
                                err = %status,
                                "unable to acknowledge delivery, expect redelivery"
                            );
                        }
                    }
                }
                SubscriptionEvent::StreamError(status) => {
                    warn!(
                        event = events::INBOUND_STREAM_ERROR,
                        component = COMPONENT,
                        session = %id,
                        err = %status,
                        "subscription stream failed, detaching"
                    );
                    reporter.transition(SessionState::Disconnected).await;
                    errors.report_error(SessionError::Delivery(status)).await;
                    break;
                }
            }
        }
    }

    /// Stops forwarding, reports `disconnected` and releases the session's
    /// resources. A service-generated subscription is deleted here, exactly
    /// once; a caller-named subscription is left in place. A failed delete
    /// surfaces as [`SessionError::Teardown`] after the close has otherwise
    /// completed. Closing twice is a no-op.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.reporter.transition(SessionState::Disconnected).await;

        let resources = match self.resources.lock().await.take() {
            Some(resources) => resources,
            None => return Ok(()),
        };

        resources.receive_task.abort();
        debug!(
            event = events::INBOUND_CLOSE,
            component = COMPONENT,
            session = %self.id,
            subscription = %resources.subscription.resource_path(),
            autogenerated = resources.autogenerated,
            "closing inbound session"
        );

        if resources.autogenerated {
            if let Err(status) = resources.subscription.delete().await {
                warn!(
                    event = events::INBOUND_SUBSCRIPTION_DELETE_FAILED,
                    component = COMPONENT,
                    session = %self.id,
                    subscription = %resources.subscription.resource_path(),
                    err = %status,
                    "unable to delete autogenerated subscription"
                );
                return Err(SessionError::Teardown(status));
            }
        }

        Ok(())
    }
}
