//! Idempotent provisioning of topics and subscription bindings.

use crate::client::{
    PubSubClient, ServiceStatus, SubscribeOptions, SubscriptionBinding, TopicHandle,
};
use crate::observability::{events, fields};
use std::sync::Arc;
use tracing::debug;

const COMPONENT: &str = "provisioning";

/// Resolves a topic handle, creating the topic when absent.
///
/// A creation conflict means another session provisioned the topic first;
/// the tie-break is a single plain lookup of the existing topic. Any other
/// failure surfaces to the caller.
pub(crate) async fn ensure_topic(
    client: &Arc<dyn PubSubClient>,
    name: &str,
) -> Result<Arc<dyn TopicHandle>, ServiceStatus> {
    debug!(
        event = events::TOPIC_ENSURE,
        component = COMPONENT,
        topic = name,
        "ensuring topic"
    );

    match client.topic(name, true).await {
        Ok(topic) => Ok(topic),
        Err(status) if status.is_conflict() => {
            debug!(
                event = events::TOPIC_CREATE_CONFLICT,
                component = COMPONENT,
                topic = name,
                "topic created concurrently, fetching existing"
            );
            client.topic(name, false).await
        }
        Err(status) => Err(status),
    }
}

/// Binds a subscription on the topic, reporting whether its name was
/// service-generated.
///
/// A conflict during creation gets one re-bind attempt, which lands on the
/// subscription the concurrent creator won with.
pub(crate) async fn ensure_subscription(
    topic: &Arc<dyn TopicHandle>,
    name: Option<&str>,
    options: &SubscribeOptions,
) -> Result<(SubscriptionBinding, bool), ServiceStatus> {
    let autogenerated = name.is_none();
    debug!(
        event = events::SUBSCRIPTION_ENSURE,
        component = COMPONENT,
        topic = topic.name(),
        subscription = %fields::format_subscription_name(name),
        "ensuring subscription"
    );

    match topic.subscribe(name, options).await {
        Ok(binding) => Ok((binding, autogenerated)),
        Err(status) if status.is_conflict() => {
            debug!(
                event = events::SUBSCRIPTION_CREATE_CONFLICT,
                component = COMPONENT,
                topic = topic.name(),
                subscription = %fields::format_subscription_name(name),
                "subscription created concurrently, rebinding"
            );
            let binding = topic.subscribe(name, options).await?;
            Ok((binding, autogenerated))
        }
        Err(status) => Err(status),
    }
}
