use super::AgentListener;
use crate::model::Percept;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Percept delivered to an agent through a channel
#[derive(Clone, Debug, Serialize)]
pub struct Delivery {
    pub agent: String,
    pub percept: Percept,
    pub delivered_at: DateTime<Utc>,
}

/// Agent listener that forwards percepts into an unbounded channel.
///
/// Lets async agent runtimes await percepts instead of being called back on
/// the notifying thread. Once the receiver is dropped every delivery fails,
/// which surfaces through the failure observer.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl AgentListener for ChannelListener {
    fn handle_percept(&self, agent: &str, percept: &Percept) -> Result<()> {
        let delivery = Delivery {
            agent: agent.to_string(),
            percept: percept.clone(),
            delivered_at: Utc::now(),
        };

        self.tx
            .send(delivery)
            .map_err(|_| anyhow!("percept receiver for agent '{}' was dropped", agent))
    }
}
