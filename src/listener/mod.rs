// Environment and per-agent listener subscriptions

mod channel;
mod registry;

pub use channel::{ChannelListener, Delivery};
pub use registry::ListenerRegistry;

use crate::model::{EnvironmentEvent, Percept};
use anyhow::Result;
use serde::Serialize;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Receives percepts addressed to an agent.
///
/// Invoked synchronously on the notifying thread. Returning an error (or
/// panicking) only affects this listener; delivery to the others continues.
pub trait AgentListener: Send + Sync {
    fn handle_percept(&self, agent: &str, percept: &Percept) -> Result<()>;
}

/// Receives environment-wide lifecycle events
pub trait EnvironmentListener: Send + Sync {
    fn handle_event(&self, event: &EnvironmentEvent) -> Result<()>;
}

/// Which kind of subscription a failed listener belongs to
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenerTarget {
    Agent { agent: String },
    Environment,
}

/// A single listener invocation that failed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListenerFailure {
    pub target: ListenerTarget,

    /// What was being delivered (percept or event name)
    pub delivery: String,

    /// Error message or panic payload
    pub error: String,
}

/// Observes listener failures that are otherwise swallowed during fan-out
pub trait FailureObserver: Send + Sync {
    fn listener_failed(&self, failure: &ListenerFailure);
}

/// Default observer: logs each failure
pub struct LogFailures;

impl FailureObserver for LogFailures {
    fn listener_failed(&self, failure: &ListenerFailure) {
        warn!(
            target_listener = ?failure.target,
            delivery = %failure.delivery,
            error = %failure.error,
            "Listener failed during notification"
        );
    }
}
