use crate::error::EnvError;
use crate::model::EnvironmentState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Management command accepted by `Environment::manage`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentCommand {
    Start,
    Pause,
    Kill,
}

impl fmt::Display for EnvironmentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentCommand::Start => write!(f, "start"),
            EnvironmentCommand::Pause => write!(f, "pause"),
            EnvironmentCommand::Kill => write!(f, "kill"),
        }
    }
}

/// State reached by applying `command` in `state`
///
/// Running and Paused toggle via Pause/Start; Kill is accepted from both and
/// is terminal. Anything else is rejected.
pub(crate) fn transition(
    state: EnvironmentState,
    command: EnvironmentCommand,
) -> Result<EnvironmentState, EnvError> {
    use EnvironmentCommand::*;
    use EnvironmentState::*;

    match (state, command) {
        (Paused, Start) => Ok(Running),
        (Running, Pause) => Ok(Paused),
        (Running | Paused, Kill) => Ok(Killed),
        (state, command) => Err(EnvError::InvalidCommand {
            command: command.to_string(),
            state,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use EnvironmentCommand::*;
        use EnvironmentState::*;

        assert_eq!(transition(Running, Pause).unwrap(), Paused);
        assert_eq!(transition(Paused, Start).unwrap(), Running);
        assert_eq!(transition(Running, Kill).unwrap(), Killed);
        assert_eq!(transition(Paused, Kill).unwrap(), Killed);
    }

    #[test]
    fn test_illegal_transitions() {
        use EnvironmentCommand::*;
        use EnvironmentState::*;

        for (state, command) in [
            (Running, Start),
            (Paused, Pause),
            (Killed, Start),
            (Killed, Pause),
            (Killed, Kill),
        ] {
            match transition(state, command) {
                Err(EnvError::InvalidCommand { command: c, state: s }) => {
                    assert_eq!(c, command.to_string());
                    assert_eq!(s, state);
                }
                other => panic!("{} in {} should be rejected, got {:?}", command, state, other),
            }
        }
    }
}
