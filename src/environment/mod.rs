// Environment facade and management state machine

mod management;

pub use crate::model::EnvironmentState;
pub use management::EnvironmentCommand;

use crate::config::EnvConfig;
use crate::dispatch::{resolve_targets, ActionDispatcher, ActionTable};
use crate::error::EnvError;
use crate::listener::{AgentListener, EnvironmentListener, FailureObserver, ListenerRegistry};
use crate::model::{Action, ActionOutcome, EnvironmentEvent, Parameter, Percept};
use crate::notify::{DeliveryReport, NotificationRouter};
use crate::relation::{RelationSnapshot, RelationStore};
use anyhow::Result;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};


/// Supplies the percepts an entity currently observes
pub trait PerceptSource: Send + Sync {
    fn fetch_percepts(&self, entity: &str) -> Result<Vec<Percept>>;
}

/// Source used when the domain provides none
pub struct NoPercepts;

impl PerceptSource for NoPercepts {
    fn fetch_percepts(&self, _entity: &str) -> Result<Vec<Percept>> {
        Ok(Vec::new())
    }
}

/// Domain callbacks around entity creation and removal.
///
/// Called after the relation change is committed, outside any registry lock,
/// so hooks may call back into the environment.
pub trait EntityHooks: Send + Sync {
    fn entity_added(&self, _entity: &str, _kind: Option<&str>) {}
    fn entity_removed(&self, _entity: &str) {}
}

/// Hooks used when the domain provides none
pub struct NoHooks;

impl EntityHooks for NoHooks {}

/// Externally visible environment: registration, entity lifecycle,
/// association, actions, percepts and management.
///
/// Composes the relation store, listener registry, notification router and
/// action dispatcher. Shared between agent threads and the engine thread via
/// `Arc`; every operation is synchronous.
pub struct Environment {
    name: String,
    store: Arc<RelationStore>,
    listeners: Arc<ListenerRegistry>,
    router: NotificationRouter,
    dispatcher: ActionDispatcher,
    percepts: Arc<dyn PerceptSource>,
    hooks: Arc<dyn EntityHooks>,
    state: RwLock<EnvironmentState>,
}

impl Environment {
    /// Build a running environment around the domain's action table
    ///
    /// Configured entities are not created here; see `seed_entities`.
    pub fn new(config: &EnvConfig, table: ActionTable) -> Self {
        let store = Arc::new(RelationStore::with_agent_limit(config.registry.max_agents));
        let listeners = Arc::new(ListenerRegistry::new(
            Arc::clone(&store),
            config.notify.event_channel_capacity,
        ));
        let router = NotificationRouter::new(Arc::clone(&store), Arc::clone(&listeners));
        let dispatcher = ActionDispatcher::new(Arc::clone(&store), table)
            .with_revalidation(config.dispatch.revalidate_targets);

        info!(
            name = %config.environment.name,
            max_agents = ?config.registry.max_agents,
            revalidate_targets = config.dispatch.revalidate_targets,
            "Environment created"
        );

        Self {
            name: config.environment.name.clone(),
            store,
            listeners,
            router,
            dispatcher,
            percepts: Arc::new(NoPercepts),
            hooks: Arc::new(NoHooks),
            state: RwLock::new(EnvironmentState::Running),
        }
    }

    pub fn with_percept_source(mut self, percepts: Arc<dyn PerceptSource>) -> Self {
        self.percepts = percepts;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn EntityHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_failure_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.router = self.router.with_observer(observer);
        self
    }

    /// Create the entities listed in the configuration
    pub fn seed_entities(&self, config: &EnvConfig) -> Result<(), EnvError> {
        for seed in &config.environment.entities {
            match &seed.kind {
                Some(kind) => self.add_typed_entity(&seed.name, kind)?,
                None => self.add_entity(&seed.name)?,
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- agents ----

    pub fn register_agent(&self, agent: &str) -> Result<(), EnvError> {
        self.store.register_agent(agent)
    }

    /// Unregister an agent, freeing its entities and dropping its listeners
    ///
    /// Returns the entities that became free.
    pub fn unregister_agent(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        let freed = self.store.unregister_agent(agent)?;
        self.listeners.drop_agent(agent);
        for entity in &freed {
            self.router.notify_free_entity(entity);
        }
        Ok(freed)
    }

    pub fn agents(&self) -> Vec<String> {
        self.store.agents()
    }

    // ---- entities ----

    pub fn add_entity(&self, entity: &str) -> Result<(), EnvError> {
        self.store.add_entity(entity)?;
        self.entity_created(entity, None);
        Ok(())
    }

    pub fn add_typed_entity(&self, entity: &str, kind: &str) -> Result<(), EnvError> {
        self.store.add_typed_entity(entity, kind)?;
        self.entity_created(entity, Some(kind));
        Ok(())
    }

    /// Remove an entity, implicitly dropping its association
    pub fn delete_entity(&self, entity: &str) -> Result<(), EnvError> {
        let owner = self.store.delete_entity(entity)?;
        if let Some(owner) = owner {
            debug!(entity = %entity, agent = %owner, "Deleted entity was associated");
        }
        self.hooks.entity_removed(entity);
        self.router.notify_deleted_entity(entity);
        Ok(())
    }

    pub fn entities(&self) -> Vec<String> {
        self.store.entities()
    }

    pub fn free_entities(&self) -> Vec<String> {
        self.store.free_entities()
    }

    pub fn entity_type(&self, entity: &str) -> Result<Option<String>, EnvError> {
        self.store.entity_type(entity)
    }

    fn entity_created(&self, entity: &str, kind: Option<&str>) {
        self.hooks.entity_added(entity, kind);
        self.router.notify_new_entity(entity);
    }

    // ---- association ----

    pub fn associate_entity(&self, agent: &str, entity: &str) -> Result<(), EnvError> {
        self.store.associate(agent, entity)
    }

    pub fn free_entity(&self, entity: &str) -> Result<(), EnvError> {
        self.store.free_entity(entity)?;
        self.router.notify_free_entity(entity);
        Ok(())
    }

    /// Free every entity of `agent`, returning them in entity order
    pub fn free_agent(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        let freed = self.store.free_agent(agent)?;
        for entity in &freed {
            self.router.notify_free_entity(entity);
        }
        Ok(freed)
    }

    pub fn free_pair(&self, agent: &str, entity: &str) -> Result<(), EnvError> {
        self.store.free_pair(agent, entity)?;
        self.router.notify_free_entity(entity);
        Ok(())
    }

    pub fn associated_entities(&self, agent: &str) -> Result<Vec<String>, EnvError> {
        self.store.entities_of(agent)
    }

    pub fn associated_agents(&self, entity: &str) -> Result<Vec<String>, EnvError> {
        self.store.agents_of(entity)
    }

    /// Create an entity named after `agent` and associate the two
    ///
    /// The agent must already be registered. If the association fails the
    /// entity is removed again.
    pub fn add_agent_entity(&self, agent: &str) -> Result<(), EnvError> {
        if !self.store.is_agent(agent) {
            return Err(EnvError::UnknownAgent(agent.to_string()));
        }

        self.add_entity(agent)?;
        if let Err(e) = self.store.associate(agent, agent) {
            warn!(agent = %agent, error = %e, "Association failed, removing entity");
            self.delete_entity(agent)?;
            return Err(e);
        }
        Ok(())
    }

    /// Undo `add_agent_entity`: free and delete the entity named after `agent`
    pub fn remove_agent_entity(&self, agent: &str) -> Result<(), EnvError> {
        self.free_pair(agent, agent)?;
        self.delete_entity(agent)
    }

    pub fn snapshot(&self) -> RelationSnapshot {
        self.store.snapshot()
    }

    // ---- actions and percepts ----

    /// Perform an action through the agent's entities
    ///
    /// An empty `targets` slice means every associated entity. Stops at the
    /// first failing target.
    pub fn act(
        &self,
        agent: &str,
        action: &Action,
        targets: &[&str],
    ) -> Result<Vec<ActionOutcome>, EnvError> {
        self.ensure_running()?;
        self.dispatcher.act(agent, action, targets)
    }

    /// Like `act`, but runs every target and reports each result
    pub fn act_each(
        &self,
        agent: &str,
        action: &Action,
        targets: &[&str],
    ) -> Result<Vec<(String, Result<Parameter, EnvError>)>, EnvError> {
        self.ensure_running()?;
        self.dispatcher.act_each(agent, action, targets)
    }

    /// Collect the percepts of the agent's entities, in target order
    ///
    /// An empty `targets` slice means every associated entity.
    pub fn perceive(&self, agent: &str, targets: &[&str]) -> Result<Vec<Percept>, EnvError> {
        self.ensure_running()?;

        let entities = resolve_targets(&self.store, agent, targets)?;

        let mut percepts = Vec::new();
        for entity in &entities {
            let fetched = self
                .percepts
                .fetch_percepts(entity)
                .map_err(|cause| EnvError::PerceiveFailed {
                    entity: entity.clone(),
                    cause,
                })?;
            percepts.extend(fetched);
        }

        debug!(agent = %agent, entities = entities.len(), percepts = percepts.len(), "Perceived");
        Ok(percepts)
    }

    // ---- listeners ----

    pub fn attach_environment_listener(&self, listener: Arc<dyn EnvironmentListener>) {
        self.listeners.attach_environment_listener(listener);
    }

    pub fn detach_environment_listener(&self, listener: &Arc<dyn EnvironmentListener>) {
        self.listeners.detach_environment_listener(listener);
    }

    pub fn attach_agent_listener(
        &self,
        agent: &str,
        listener: Arc<dyn AgentListener>,
    ) -> Result<(), EnvError> {
        self.listeners.attach_agent_listener(agent, listener)
    }

    pub fn detach_agent_listener(&self, agent: &str, listener: &Arc<dyn AgentListener>) {
        self.listeners.detach_agent_listener(agent, listener);
    }

    /// Async stream of environment events, for tasks that prefer channels
    pub fn subscribe_events(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.listeners.subscribe_events()
    }

    // ---- notification ----

    pub fn notify_agents(
        &self,
        percept: &Percept,
        agents: &[&str],
    ) -> Result<DeliveryReport, EnvError> {
        self.router.notify_agents(percept, agents)
    }

    pub fn notify_via_entities(
        &self,
        percept: &Percept,
        entities: &[&str],
    ) -> Result<DeliveryReport, EnvError> {
        self.router.notify_via_entities(percept, entities)
    }

    /// Raise a percept in the world, heard by the agents controlling `receivers`
    ///
    /// An empty `receivers` slice means every entity.
    pub fn throw_event(
        &self,
        percept: &Percept,
        receivers: &[&str],
    ) -> Result<DeliveryReport, EnvError> {
        debug!(percept = %percept, receivers = receivers.len(), "Event thrown");
        self.router.notify_via_entities(percept, receivers)
    }

    pub fn notify_environment_event(&self, event: &EnvironmentEvent) -> DeliveryReport {
        self.router.notify_environment_event(event)
    }

    // ---- management ----

    pub fn state(&self) -> EnvironmentState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a management command, returning the new state
    pub fn manage(&self, command: EnvironmentCommand) -> Result<EnvironmentState, EnvError> {
        let (from, to) = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let from = *state;
            let to = management::transition(from, command)?;
            *state = to;
            (from, to)
        };

        info!(
            name = %self.name,
            command = %command,
            from = %from,
            to = %to,
            "Environment state changed"
        );
        self.router
            .notify_environment_event(&EnvironmentEvent::StateChanged { from, to });
        Ok(to)
    }

    /// False once the environment has been killed
    pub fn is_connected(&self) -> bool {
        self.state() != EnvironmentState::Killed
    }

    /// Kill the environment (if still alive) and drop every listener
    pub fn release(&self) {
        if self.is_connected() {
            if let Err(e) = self.manage(EnvironmentCommand::Kill) {
                warn!(name = %self.name, error = %e, "Kill during release failed");
            }
        }
        self.listeners.clear();
        info!(name = %self.name, "Environment released");
    }

    fn ensure_running(&self) -> Result<(), EnvError> {
        match self.state() {
            EnvironmentState::Running => Ok(()),
            state => Err(EnvError::NoEnvironment(state)),
        }
    }
}
