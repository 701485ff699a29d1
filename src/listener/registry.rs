use super::{AgentListener, EnvironmentListener};
use crate::error::EnvError;
use crate::model::EnvironmentEvent;
use crate::relation::RelationStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

/// Listener identity is the allocation, not the vtable
fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Holds environment-level and per-agent listener subscriptions.
///
/// Listeners are shared references; attaching the same listener twice keeps
/// a single subscription and detaching an absent listener does nothing.
/// Subscription order is preserved.
pub struct ListenerRegistry {
    /// Used only to check that an agent is registered
    store: Arc<RelationStore>,

    environment: RwLock<Vec<Arc<dyn EnvironmentListener>>>,

    /// agent name -> listeners in subscription order
    agents: DashMap<String, Vec<Arc<dyn AgentListener>>>,

    /// Broadcast channel mirroring every environment event
    events_tx: broadcast::Sender<EnvironmentEvent>,
}

impl ListenerRegistry {
    pub fn new(store: Arc<RelationStore>, event_channel_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(event_channel_capacity.max(1));

        Self {
            store,
            environment: RwLock::new(Vec::new()),
            agents: DashMap::new(),
            events_tx,
        }
    }

    pub fn attach_environment_listener(&self, listener: Arc<dyn EnvironmentListener>) {
        let mut listeners = self
            .environment
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
            debug!(count = listeners.len(), "Environment listener attached");
        }
    }

    pub fn detach_environment_listener(&self, listener: &Arc<dyn EnvironmentListener>) {
        self.environment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !same_listener(l, listener));
    }

    /// Subscribe a listener to percepts addressed to `agent`
    ///
    /// Fails with `UnknownAgent` if the agent is not registered. The check
    /// runs while the agent's map entry is locked, so it cannot interleave
    /// with `drop_agent` after an unregister.
    pub fn attach_agent_listener(
        &self,
        agent: &str,
        listener: Arc<dyn AgentListener>,
    ) -> Result<(), EnvError> {
        match self.agents.entry(agent.to_string()) {
            Entry::Occupied(mut entry) => {
                if !self.store.is_agent(agent) {
                    entry.remove();
                    return Err(EnvError::UnknownAgent(agent.to_string()));
                }
                let listeners = entry.get_mut();
                if !listeners.iter().any(|l| same_listener(l, &listener)) {
                    listeners.push(listener);
                    debug!(agent = %agent, count = listeners.len(), "Agent listener attached");
                }
            }
            Entry::Vacant(entry) => {
                if !self.store.is_agent(agent) {
                    return Err(EnvError::UnknownAgent(agent.to_string()));
                }
                entry.insert(vec![listener]);
                debug!(agent = %agent, count = 1, "Agent listener attached");
            }
        }

        Ok(())
    }

    pub fn detach_agent_listener(&self, agent: &str, listener: &Arc<dyn AgentListener>) {
        if let Some(mut listeners) = self.agents.get_mut(agent) {
            listeners.retain(|l| !same_listener(l, listener));
        }
        self.agents.remove_if(agent, |_, listeners| listeners.is_empty());
    }

    /// Remove every subscription of an agent (used on unregister)
    pub fn drop_agent(&self, agent: &str) {
        if self.agents.remove(agent).is_some() {
            debug!(agent = %agent, "Agent listeners dropped");
        }
    }

    /// Remove all subscriptions
    pub fn clear(&self) {
        self.agents.clear();
        self.environment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Copy of the environment listeners in subscription order
    pub fn environment_listeners(&self) -> Vec<Arc<dyn EnvironmentListener>> {
        self.environment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the listeners attached to `agent` in subscription order
    pub fn agent_listeners(&self, agent: &str) -> Vec<Arc<dyn AgentListener>> {
        self.agents
            .get(agent)
            .map(|l| l.value().clone())
            .unwrap_or_default()
    }

    /// Subscribe to environment events as an async stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.events_tx.subscribe()
    }

    /// Publish an event on the broadcast channel (no receivers is fine)
    pub(crate) fn publish_event(&self, event: &EnvironmentEvent) {
        let _ = self.events_tx.send(event.clone());
    }
}
