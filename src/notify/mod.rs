use crate::error::{panic_message, EnvError};
use crate::listener::{
    FailureObserver, ListenerFailure, ListenerRegistry, ListenerTarget, LogFailures,
};
use crate::model::{EnvironmentEvent, Percept};
use crate::relation::RelationStore;
use anyhow::Result;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::debug;


/// Outcome of one fan-out
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeliveryReport {
    /// Listener invocations that succeeded
    pub delivered: usize,

    /// Listener invocations that failed, in delivery order
    pub failures: Vec<ListenerFailure>,
}

impl DeliveryReport {
    /// True if no listener failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Routes percepts to agent listeners and events to environment listeners.
///
/// Delivery is synchronous on the caller's thread. Agents are visited in
/// registration order (or the order given), listeners in subscription order.
/// A failing or panicking listener is reported to the failure observer and
/// never stops delivery to the remaining listeners.
pub struct NotificationRouter {
    store: Arc<RelationStore>,
    listeners: Arc<ListenerRegistry>,
    observer: Arc<dyn FailureObserver>,
}

impl NotificationRouter {
    pub fn new(store: Arc<RelationStore>, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            store,
            listeners,
            observer: Arc::new(LogFailures),
        }
    }

    /// Replace the default logging failure observer
    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Deliver a percept to agents
    ///
    /// An empty `agents` slice means every registered agent. Otherwise every
    /// named agent must be registered; the check happens before anything is
    /// delivered, so a rejected call delivers nothing.
    pub fn notify_agents(
        &self,
        percept: &Percept,
        agents: &[&str],
    ) -> Result<DeliveryReport, EnvError> {
        let targets: Vec<String> = if agents.is_empty() {
            self.store.agents()
        } else {
            let registered = self.store.agents();
            if let Some(unknown) = agents.iter().find(|a| !registered.iter().any(|r| r == *a)) {
                return Err(EnvError::UnknownAgent(unknown.to_string()));
            }
            agents.iter().map(|a| a.to_string()).collect()
        };

        let mut report = DeliveryReport::default();
        for agent in &targets {
            self.deliver_percept(agent, percept, &mut report);
        }

        debug!(
            percept = %percept.name,
            agents = targets.len(),
            delivered = report.delivered,
            failed = report.failures.len(),
            "Percept delivered to agents"
        );
        Ok(report)
    }

    /// Deliver a percept to the agents owning the given entities
    ///
    /// An empty `entities` slice means every entity. Each named entity must
    /// exist. Free entities reach nobody, and an agent owning several of the
    /// targeted entities receives the percept once.
    pub fn notify_via_entities(
        &self,
        percept: &Percept,
        entities: &[&str],
    ) -> Result<DeliveryReport, EnvError> {
        let snapshot = self.store.snapshot();

        if let Some(unknown) = entities
            .iter()
            .find(|e| !snapshot.entities.iter().any(|r| r.name == **e))
        {
            return Err(EnvError::UnknownEntity(unknown.to_string()));
        }

        let mut owners: Vec<String> = Vec::new();
        let mut add_owner = |owner: &Option<String>| {
            if let Some(owner) = owner {
                if !owners.contains(owner) {
                    owners.push(owner.clone());
                }
            }
        };

        if entities.is_empty() {
            for record in &snapshot.entities {
                add_owner(&record.owner);
            }
        } else {
            for entity in entities {
                if let Some(record) = snapshot.entities.iter().find(|r| r.name == *entity) {
                    add_owner(&record.owner);
                }
            }
        }

        let mut report = DeliveryReport::default();
        for agent in &owners {
            self.deliver_percept(agent, percept, &mut report);
        }
        Ok(report)
    }

    /// Broadcast an event to all environment listeners and the event channel
    pub fn notify_environment_event(&self, event: &EnvironmentEvent) -> DeliveryReport {
        let label = event_label(event);
        let mut report = DeliveryReport::default();

        for listener in self.listeners.environment_listeners() {
            match guarded(|| listener.handle_event(event)) {
                Ok(()) => report.delivered += 1,
                Err(error) => self.record_failure(
                    &mut report,
                    ListenerFailure {
                        target: ListenerTarget::Environment,
                        delivery: label.clone(),
                        error,
                    },
                ),
            }
        }

        self.listeners.publish_event(event);
        report
    }

    pub fn notify_new_entity(&self, entity: &str) -> DeliveryReport {
        self.notify_environment_event(&EnvironmentEvent::EntityAdded {
            entity: entity.to_string(),
        })
    }

    pub fn notify_free_entity(&self, entity: &str) -> DeliveryReport {
        self.notify_environment_event(&EnvironmentEvent::EntityFreed {
            entity: entity.to_string(),
        })
    }

    pub fn notify_deleted_entity(&self, entity: &str) -> DeliveryReport {
        self.notify_environment_event(&EnvironmentEvent::EntityDeleted {
            entity: entity.to_string(),
        })
    }

    fn deliver_percept(&self, agent: &str, percept: &Percept, report: &mut DeliveryReport) {
        for listener in self.listeners.agent_listeners(agent) {
            match guarded(|| listener.handle_percept(agent, percept)) {
                Ok(()) => report.delivered += 1,
                Err(error) => self.record_failure(
                    report,
                    ListenerFailure {
                        target: ListenerTarget::Agent {
                            agent: agent.to_string(),
                        },
                        delivery: percept.name.clone(),
                        error,
                    },
                ),
            }
        }
    }

    fn record_failure(&self, report: &mut DeliveryReport, failure: ListenerFailure) {
        self.observer.listener_failed(&failure);
        report.failures.push(failure);
    }
}

/// Run a listener callback, turning errors and panics into a message
fn guarded<F>(callback: F) -> std::result::Result<(), String>
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(payload) => Err(format!("listener panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn event_label(event: &EnvironmentEvent) -> String {
    match event {
        EnvironmentEvent::EntityAdded { entity } => format!("entity_added({})", entity),
        EnvironmentEvent::EntityFreed { entity } => format!("entity_freed({})", entity),
        EnvironmentEvent::EntityDeleted { entity } => format!("entity_deleted({})", entity),
        EnvironmentEvent::StateChanged { from, to } => format!("state_changed({} -> {})", from, to),
        EnvironmentEvent::Custom { percept } => percept.to_string(),
    }
}
