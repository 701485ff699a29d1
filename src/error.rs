use crate::model::EnvironmentState;
use std::any::Any;
use std::fmt;

/// Errors reported by the registry, the dispatcher and the environment facade.
///
/// Registry violations leave the relation store unchanged. Variants carrying a
/// `cause` wrap a domain-side failure raised by a handler or percept source.
#[derive(Debug)]
pub enum EnvError {
    DuplicateAgent(String),
    UnknownAgent(String),
    /// Agent tried to act or perceive without being registered
    UnregisteredAgent(String),
    TooManyAgents {
        agent: String,
        limit: usize,
    },
    DuplicateEntity(String),
    UnknownEntity(String),
    NotFree {
        entity: String,
        owner: String,
    },
    NotAssociated(String),
    NoAssociatedEntity(String),
    EntityNotAssociated {
        agent: String,
        entity: String,
    },
    NoSuchAction {
        action: String,
        shape: String,
    },
    DispatchError {
        action: String,
        entity: String,
        reason: String,
    },
    ActionFailed {
        action: String,
        entity: String,
        cause: anyhow::Error,
    },
    PerceiveFailed {
        entity: String,
        cause: anyhow::Error,
    },
    NoEnvironment(EnvironmentState),
    InvalidCommand {
        command: String,
        state: EnvironmentState,
    },
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::DuplicateAgent(agent) => {
                write!(f, "agent '{}' has already registered to the environment", agent)
            }
            EnvError::UnknownAgent(agent) => {
                write!(f, "agent '{}' has not registered to the environment", agent)
            }
            EnvError::UnregisteredAgent(agent) => {
                write!(f, "agent '{}' must register before acting or perceiving", agent)
            }
            EnvError::TooManyAgents { agent, limit } => write!(
                f,
                "cannot register agent '{}': environment accepts at most {} agents",
                agent, limit
            ),
            EnvError::DuplicateEntity(entity) => {
                write!(f, "entity '{}' already exists", entity)
            }
            EnvError::UnknownEntity(entity) => write!(f, "entity '{}' does not exist", entity),
            EnvError::NotFree { entity, owner } => write!(
                f,
                "entity '{}' is not free: it is associated with agent '{}'",
                entity, owner
            ),
            EnvError::NotAssociated(entity) => {
                write!(f, "entity '{}' is not associated with any agent", entity)
            }
            EnvError::NoAssociatedEntity(agent) => {
                write!(f, "agent '{}' has no associated entities", agent)
            }
            EnvError::EntityNotAssociated { agent, entity } => write!(
                f,
                "entity '{}' is not associated with agent '{}'",
                entity, agent
            ),
            EnvError::NoSuchAction { action, shape } => write!(
                f,
                "no handler for action '{}' with parameters {}",
                action, shape
            ),
            EnvError::DispatchError {
                action,
                entity,
                reason,
            } => write!(
                f,
                "action '{}' could not be dispatched to entity '{}': {}",
                action, entity, reason
            ),
            EnvError::ActionFailed {
                action,
                entity,
                cause,
            } => write!(
                f,
                "action '{}' failed on entity '{}': {:#}",
                action, entity, cause
            ),
            EnvError::PerceiveFailed { entity, cause } => write!(
                f,
                "percepts of entity '{}' could not be retrieved: {:#}",
                entity, cause
            ),
            EnvError::NoEnvironment(state) => {
                write!(f, "environment is {}, actions and percepts are unavailable", state)
            }
            EnvError::InvalidCommand { command, state } => write!(
                f,
                "command '{}' is not allowed while the environment is {}",
                command, state
            ),
        }
    }
}

impl std::error::Error for EnvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvError::ActionFailed { cause, .. } | EnvError::PerceiveFailed { cause, .. } => {
                Some(&**cause)
            }
            _ => None,
        }
    }
}

/// Text of a panic payload caught with `catch_unwind`
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_messages_name_the_offender() {
        let err = EnvError::NotFree {
            entity: "e1".to_string(),
            owner: "a2".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "entity 'e1' is not free: it is associated with agent 'a2'"
        );

        let err = EnvError::NoSuchAction {
            action: "move".to_string(),
            shape: "(numeral)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no handler for action 'move' with parameters (numeral)"
        );
    }

    #[test]
    fn test_action_failed_exposes_cause() {
        let err = EnvError::ActionFailed {
            action: "attack".to_string(),
            entity: "marine_1".to_string(),
            cause: anyhow::anyhow!("target out of range"),
        };
        assert!(err.to_string().contains("target out of range"));
        let source = err.source().expect("cause should be exposed");
        assert_eq!(source.to_string(), "target out of range");
    }

    #[test]
    fn test_registry_errors_have_no_source() {
        assert!(EnvError::UnknownAgent("a1".to_string()).source().is_none());
    }
}
