use super::Args;
use crate::model::{describe_shape, ParamKind, Parameter};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Failure raised by an action handler
#[derive(Debug)]
pub enum HandlerError {
    /// The action was understood but failed in the domain
    Failed(anyhow::Error),

    /// A parameter did not have the shape the handler needs
    Argument {
        index: usize,
        expected: ParamKind,
        /// `None` if the parameter was missing
        found: Option<ParamKind>,
    },
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Failed(e) => write!(f, "{:#}", e),
            HandlerError::Argument {
                index,
                expected,
                found: Some(found),
            } => write!(
                f,
                "parameter {} should be {}, found {}",
                index, expected, found
            ),
            HandlerError::Argument {
                index,
                expected,
                found: None,
            } => write!(f, "parameter {} ({}) is missing", index, expected),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<anyhow::Error> for HandlerError {
    fn from(e: anyhow::Error) -> Self {
        HandlerError::Failed(e)
    }
}

/// Action handler: receives the acting entity and the action parameters
pub type Handler = Arc<dyn Fn(&str, &Args<'_>) -> Result<Parameter, HandlerError> + Send + Sync>;

struct Overload {
    shape: Vec<ParamKind>,
    handler: Handler,
}

impl Overload {
    fn matches(&self, params: &[Parameter]) -> bool {
        self.shape.len() == params.len()
            && self.shape.iter().zip(params).all(|(kind, p)| kind.accepts(p))
    }
}

/// Registration table mapping `(action name, parameter shape)` to a handler.
///
/// Built once by the domain environment before the dispatcher starts; the
/// dispatcher stays generic over whatever vocabulary is registered here.
/// Several shapes may be registered under one name. Lookup tries them in
/// registration order and takes the first whose arity and kinds match.
#[derive(Default)]
pub struct ActionTable {
    actions: HashMap<String, Vec<Overload>>,
}

impl ActionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `name` taking parameters of the given kinds
    ///
    /// Registering an identical shape again replaces the earlier handler.
    pub fn register<F>(&mut self, name: &str, shape: &[ParamKind], handler: F) -> &mut Self
    where
        F: Fn(&str, &Args<'_>) -> Result<Parameter, HandlerError> + Send + Sync + 'static,
    {
        let overloads = self.actions.entry(name.to_string()).or_default();
        let handler: Handler = Arc::new(handler);

        if let Some(existing) = overloads.iter_mut().find(|o| o.shape == shape) {
            warn!(
                action = %name,
                shape = %describe_shape(shape),
                "Replacing previously registered action handler"
            );
            existing.handler = handler;
        } else {
            overloads.push(Overload {
                shape: shape.to_vec(),
                handler,
            });
        }

        self
    }

    /// Find the handler for `name` whose shape matches `params`
    pub fn lookup(&self, name: &str, params: &[Parameter]) -> Option<Handler> {
        self.actions
            .get(name)?
            .iter()
            .find(|o| o.matches(params))
            .map(|o| Arc::clone(&o.handler))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names with their shapes, sorted by name
    pub fn signatures(&self) -> Vec<(String, Vec<ParamKind>)> {
        let mut signatures: Vec<(String, Vec<ParamKind>)> = self
            .actions
            .iter()
            .flat_map(|(name, overloads)| {
                overloads
                    .iter()
                    .map(move |o| (name.clone(), o.shape.clone()))
            })
            .collect();
        signatures.sort_by(|a, b| a.0.cmp(&b.0));
        signatures
    }
}
