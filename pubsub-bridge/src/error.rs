//! Error taxonomy for session construction, delivery and teardown.

use crate::client::ServiceStatus;
use thiserror::Error;

/// Configuration problems caught before a session attempts to connect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("credentials are missing")]
    MissingCredentials,
    #[error("credentials are not valid JSON: {0}")]
    InvalidCredentials(String),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("ack deadline must be greater than zero seconds")]
    InvalidAckDeadline,
    #[error("poll interval must be greater than zero milliseconds")]
    InvalidPollInterval,
    #[error("timeout must be greater than zero milliseconds")]
    InvalidTimeout,
}

/// Session-level failures.
///
/// `Config`, `Connect` and `Provision` are fatal and surface from session
/// construction. `Delivery` is reported through the error sink while the
/// session keeps its resources. `Teardown` surfaces from closing an inbound
/// session whose autogenerated subscription could not be deleted; the close
/// itself still completes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unable to connect to the pub/sub service: {0}")]
    Connect(ServiceStatus),
    #[error("unable to provision pub/sub resources: {0}")]
    Provision(ServiceStatus),
    #[error("message delivery failed: {0}")]
    Delivery(ServiceStatus),
    #[error("session teardown failed: {0}")]
    Teardown(ServiceStatus),
}
