use serde::{Deserialize, Serialize};
use std::fmt;


/// Parameter is a typed value carried by actions, percepts and action results.
///
/// The conversion between an agent language's terms and these values lives
/// outside this crate; the registry only routes and matches them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    /// Symbolic constant (e.g. "north", "idle")
    Identifier(String),

    /// Numeric value
    Numeral(f64),

    /// Boolean value
    Truth(bool),

    /// Ordered list of parameters
    List(Vec<Parameter>),

    /// Named compound term, e.g. `pos(3, 4)`
    Function { name: String, params: Vec<Parameter> },
}

impl Parameter {
    pub fn ident(value: impl Into<String>) -> Self {
        Parameter::Identifier(value.into())
    }

    pub fn num(value: impl Into<f64>) -> Self {
        Parameter::Numeral(value.into())
    }

    pub fn truth(value: bool) -> Self {
        Parameter::Truth(value)
    }

    pub fn list(items: Vec<Parameter>) -> Self {
        Parameter::List(items)
    }

    pub fn function(name: impl Into<String>, params: Vec<Parameter>) -> Self {
        Parameter::Function {
            name: name.into(),
            params,
        }
    }

    /// Kind of this value, used for handler signature matching
    pub fn kind(&self) -> ParamKind {
        match self {
            Parameter::Identifier(_) => ParamKind::Identifier,
            Parameter::Numeral(_) => ParamKind::Numeral,
            Parameter::Truth(_) => ParamKind::Truth,
            Parameter::List(_) => ParamKind::List,
            Parameter::Function { .. } => ParamKind::Function,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Identifier(s) => write!(f, "{}", s),
            Parameter::Numeral(n) => write!(f, "{}", n),
            Parameter::Truth(b) => write!(f, "{}", b),
            Parameter::List(items) => {
                write!(f, "[")?;
                write_joined(f, items)?;
                write!(f, "]")
            }
            Parameter::Function { name, params } => {
                write!(f, "{}(", name)?;
                write_joined(f, params)?;
                write!(f, ")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Parameter]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Declared kind of a handler parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Identifier,
    Numeral,
    Truth,
    List,
    Function,
    /// Matches a parameter of any kind
    Any,
}

impl ParamKind {
    /// Returns true if a parameter of this declared kind accepts `value`
    pub fn accepts(self, value: &Parameter) -> bool {
        self == ParamKind::Any || self == value.kind()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKind::Identifier => "identifier",
            ParamKind::Numeral => "numeral",
            ParamKind::Truth => "truth",
            ParamKind::List => "list",
            ParamKind::Function => "function",
            ParamKind::Any => "any",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders a parameter shape as `(numeral, identifier)` for error messages
pub fn describe_shape(kinds: &[ParamKind]) -> String {
    let parts: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
    format!("({})", parts.join(", "))
}

/// Percept is an immutable observation delivered to an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Percept {
    /// Percept name (e.g. "position", "gameStarted")
    pub name: String,

    /// Ordered parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Percept {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }
}

impl fmt::Display for Percept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_joined(f, &self.parameters)?;
        write!(f, ")")
    }
}

/// Action is a named, parameterized request issued by an agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,

    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Action {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    /// Kinds of the supplied parameters, in order
    pub fn shape(&self) -> Vec<ParamKind> {
        self.parameters.iter().map(Parameter::kind).collect()
    }
}

/// Result of one handler invocation against one entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Entity the action was performed on
    pub entity: String,

    /// Value returned by the handler
    pub value: Parameter,
}

/// Lifecycle of the environment as a whole
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    Running,
    Paused,
    Killed,
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentState::Running => write!(f, "running"),
            EnvironmentState::Paused => write!(f, "paused"),
            EnvironmentState::Killed => write!(f, "killed"),
        }
    }
}

/// Event broadcast to environment-level listeners
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentEvent {
    EntityAdded { entity: String },
    EntityFreed { entity: String },
    EntityDeleted { entity: String },
    StateChanged {
        from: EnvironmentState,
        to: EnvironmentState,
    },
    Custom { percept: Percept },
}
