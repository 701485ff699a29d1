// Percept, action and parameter model
pub mod model;

// Error taxonomy for registry and dispatch failures
pub mod error;

// Agent/entity relation store
pub mod relation;

// Environment and per-agent listener subscriptions
pub mod listener;

// Percept and event routing
pub mod notify;

// Action table and dispatch
pub mod dispatch;

// Environment facade and management state machine
pub mod environment;

// Configuration loading
pub mod config;

pub use config::{load_config, EnvConfig};
pub use dispatch::{ActionDispatcher, ActionTable, Args, HandlerError};
pub use environment::{
    EntityHooks, Environment, EnvironmentCommand, EnvironmentState, PerceptSource,
};
pub use error::EnvError;
pub use listener::{
    AgentListener, ChannelListener, Delivery, EnvironmentListener, FailureObserver,
    ListenerFailure, ListenerRegistry,
};
pub use model::{Action, ActionOutcome, EnvironmentEvent, ParamKind, Parameter, Percept};
pub use notify::{DeliveryReport, NotificationRouter};
pub use relation::{RelationSnapshot, RelationStore};
