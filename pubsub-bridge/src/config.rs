//! Session configuration surface supplied by the host runtime.

use crate::client::SubscribeOptions;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// Opaque authentication material for the service connector.
///
/// The bridge never inspects the contents beyond checking that they parse
/// as JSON; interpretation belongs to the connector. `Debug` redacts the
/// material so it cannot leak into logs.
#[derive(Clone)]
pub struct Credentials {
    material: Option<serde_json::Value>,
}

impl Credentials {
    /// Parses raw JSON credential material.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let material = serde_json::from_str(raw)
            .map_err(|e| ConfigError::InvalidCredentials(e.to_string()))?;
        Ok(Self {
            material: Some(material),
        })
    }

    /// Placeholder for absent credential material. Sessions fail fast on it.
    pub fn missing() -> Self {
        Self { material: None }
    }

    pub fn is_missing(&self) -> bool {
        self.material.is_none()
    }

    pub fn material(&self) -> Option<&serde_json::Value> {
        self.material.as_ref()
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.material.is_some() {
            write!(f, "Credentials(redacted)")
        } else {
            write!(f, "Credentials(missing)")
        }
    }
}

/// How delivered payload bytes are decoded into flow payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Pass payload bytes through untouched.
    #[default]
    Binary,
    /// Decode payload bytes as UTF-8 text.
    String,
}

/// Immutable per-session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Topic the session publishes to or subscribes on.
    pub topic: String,
    /// Named subscription to bind. Empty or absent selects a
    /// service-generated ephemeral subscription.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Acknowledgement deadline in seconds.
    #[serde(default)]
    pub ack_deadline_seconds: Option<u32>,
    /// Payload decoding for inbound sessions.
    #[serde(default)]
    pub encoding: Option<EncodingMode>,
    /// Polling interval in milliseconds.
    #[serde(default)]
    pub poll_interval: Option<u64>,
    /// Pull timeout in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl SessionConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription: None,
            ack_deadline_seconds: None,
            encoding: None,
            poll_interval: None,
            timeout: None,
        }
    }

    /// Checks the configuration before a session attempts to connect.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if let Some(0) = self.ack_deadline_seconds {
            return Err(ConfigError::InvalidAckDeadline);
        }
        if let Some(0) = self.poll_interval {
            return Err(ConfigError::InvalidPollInterval);
        }
        if let Some(0) = self.timeout {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    /// Named subscription to bind, with empty and whitespace-only names
    /// normalized away.
    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Decode mode for delivered payloads.
    pub fn decode_encoding(&self) -> EncodingMode {
        self.encoding.unwrap_or_default()
    }

    /// Subscription tuning assembled from the explicitly configured fields
    /// only. Unset fields stay unset so the service applies its defaults.
    pub fn subscribe_options(&self) -> SubscribeOptions {
        SubscribeOptions {
            ack_deadline: self
                .ack_deadline_seconds
                .map(|seconds| Duration::from_secs(seconds.into())),
            encoding: self.encoding,
            poll_interval: self.poll_interval.map(Duration::from_millis),
            timeout: self.timeout.map(Duration::from_millis),
        }
    }
}
