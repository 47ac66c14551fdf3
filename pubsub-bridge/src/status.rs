//! Session lifecycle states and the label sink they are reported through.

use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Link state label surfaced to the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
    Publishing,
}

impl Display for LinkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LinkStatus::Disconnected => "disconnected",
            LinkStatus::Connecting => "connecting",
            LinkStatus::Connected => "connected",
            LinkStatus::Publishing => "publishing",
        };
        write!(f, "{label}")
    }
}

/// Internal session lifecycle state.
///
/// Several states share one [`LinkStatus`] label: provisioning is still
/// reported as connecting, receiving as connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Provisioning,
    Connected,
    Receiving,
    Publishing,
}

impl From<SessionState> for LinkStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Disconnected => LinkStatus::Disconnected,
            SessionState::Connecting | SessionState::Provisioning => LinkStatus::Connecting,
            SessionState::Connected | SessionState::Receiving => LinkStatus::Connected,
            SessionState::Publishing => LinkStatus::Publishing,
        }
    }
}

/// External sink receiving link state labels. Pure output, no feedback.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, status: LinkStatus);
}

/// Maps session state transitions onto link labels and forwards them,
/// collapsing consecutive repeats of the same label.
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
    last: Mutex<Option<LinkStatus>>,
}

impl StatusReporter {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            sink,
            last: Mutex::new(None),
        }
    }

    pub async fn transition(&self, state: SessionState) {
        self.report(LinkStatus::from(state)).await;
    }

    pub async fn report(&self, status: LinkStatus) {
        let mut last = self.last.lock().await;
        if *last == Some(status) {
            return;
        }
        *last = Some(status);
        self.sink.report(status).await;
    }
}
