// Action table and dispatch

mod args;
mod table;

pub use args::Args;
pub use table::{ActionTable, Handler, HandlerError};

use crate::error::{panic_message, EnvError};
use crate::model::{describe_shape, Action, ActionOutcome, Parameter};
use crate::relation::RelationStore;
use anyhow::anyhow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};


/// Routes an agent's action to the handler registered for it, once per
/// target entity.
///
/// Target resolution and invocation are not one atomic step: another caller
/// may free an entity while a multi-entity action is running. With
/// revalidation enabled (the default) ownership is checked again right before
/// each invocation and a target that changed hands fails with
/// `EntityNotAssociated`. With revalidation disabled the handler is invoked
/// for every resolved target and must cope with just-freed entities itself.
pub struct ActionDispatcher {
    store: Arc<RelationStore>,
    table: ActionTable,
    revalidate_targets: bool,
}

impl ActionDispatcher {
    pub fn new(store: Arc<RelationStore>, table: ActionTable) -> Self {
        Self {
            store,
            table,
            revalidate_targets: true,
        }
    }

    pub fn with_revalidation(mut self, revalidate_targets: bool) -> Self {
        self.revalidate_targets = revalidate_targets;
        self
    }

    /// Perform an action on behalf of `agent`
    ///
    /// An empty `targets` slice means every entity associated with the agent.
    /// Stops at the first failing target and returns its error; otherwise
    /// returns one outcome per target in target order.
    pub fn act(
        &self,
        agent: &str,
        action: &Action,
        targets: &[&str],
    ) -> Result<Vec<ActionOutcome>, EnvError> {
        let (entities, handler) = self.prepare(agent, action, targets)?;

        let mut outcomes = Vec::with_capacity(entities.len());
        for entity in entities {
            let value = self.invoke(agent, action, &handler, &entity)?;
            outcomes.push(ActionOutcome { entity, value });
        }

        debug!(
            agent = %agent,
            action = %action.name,
            targets = outcomes.len(),
            "Action performed"
        );
        Ok(outcomes)
    }

    /// Perform an action on every target, collecting each target's result
    ///
    /// Precondition failures (unregistered agent, no entities, foreign
    /// targets, unknown action) still fail the whole call.
    pub fn act_each(
        &self,
        agent: &str,
        action: &Action,
        targets: &[&str],
    ) -> Result<Vec<(String, Result<Parameter, EnvError>)>, EnvError> {
        let (entities, handler) = self.prepare(agent, action, targets)?;

        Ok(entities
            .into_iter()
            .map(|entity| {
                let result = self.invoke(agent, action, &handler, &entity);
                (entity, result)
            })
            .collect())
    }

    /// Resolve target entities and the handler
    fn prepare(
        &self,
        agent: &str,
        action: &Action,
        targets: &[&str],
    ) -> Result<(Vec<String>, Handler), EnvError> {
        let entities = resolve_targets(&self.store, agent, targets)?;

        let handler = self
            .table
            .lookup(&action.name, &action.parameters)
            .ok_or_else(|| EnvError::NoSuchAction {
                action: action.name.clone(),
                shape: describe_shape(&action.shape()),
            })?;

        Ok((entities, handler))
    }

    /// Run the handler for one target
    ///
    /// A panicking handler is reported as `ActionFailed` for that target.
    fn invoke(
        &self,
        agent: &str,
        action: &Action,
        handler: &Handler,
        entity: &str,
    ) -> Result<Parameter, EnvError> {
        if self.revalidate_targets && self.store.owner_of(entity).as_deref() != Some(agent) {
            warn!(
                agent = %agent,
                entity = %entity,
                action = %action.name,
                "Target changed hands before invocation"
            );
            return Err(EnvError::EntityNotAssociated {
                agent: agent.to_string(),
                entity: entity.to_string(),
            });
        }

        let args = Args::new(&action.parameters);
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(entity, &args)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(
                    entity = %entity,
                    action = %action.name,
                    panic = %message,
                    "Action handler panicked"
                );
                Err(HandlerError::Failed(anyhow!("handler panicked: {}", message)))
            });

        result.map_err(|e| match e {
            HandlerError::Failed(cause) => EnvError::ActionFailed {
                action: action.name.clone(),
                entity: entity.to_string(),
                cause,
            },
            argument @ HandlerError::Argument { .. } => EnvError::DispatchError {
                action: action.name.clone(),
                entity: entity.to_string(),
                reason: argument.to_string(),
            },
        })
    }
}

/// Entities an agent addresses: all of its entities when `targets` is empty,
/// otherwise `targets` deduplicated in the given order
///
/// Fails with `UnregisteredAgent`, `NoAssociatedEntity` or
/// `EntityNotAssociated`, checked in that order.
pub(crate) fn resolve_targets(
    store: &RelationStore,
    agent: &str,
    targets: &[&str],
) -> Result<Vec<String>, EnvError> {
    let associated = store
        .entities_of(agent)
        .map_err(|_| EnvError::UnregisteredAgent(agent.to_string()))?;

    if associated.is_empty() {
        return Err(EnvError::NoAssociatedEntity(agent.to_string()));
    }
    if targets.is_empty() {
        return Ok(associated);
    }

    let mut selected: Vec<String> = Vec::with_capacity(targets.len());
    for target in targets {
        if !associated.iter().any(|e| e == target) {
            return Err(EnvError::EntityNotAssociated {
                agent: agent.to_string(),
                entity: target.to_string(),
            });
        }
        if !selected.iter().any(|e| e == target) {
            selected.push(target.to_string());
        }
    }
    Ok(selected)
}
