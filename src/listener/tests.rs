use super::*;
use crate::error::EnvError;
use crate::model::{EnvironmentEvent, Percept};
use crate::relation::RelationStore;
use std::sync::{Arc, Mutex};

struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl AgentListener for Recorder {
    fn handle_percept(&self, agent: &str, percept: &Percept) -> anyhow::Result<()> {
        self.seen
            .lock()
            .unwrap()
            .push(format!("{}:{}", agent, percept.name));
        Ok(())
    }
}

impl EnvironmentListener for Recorder {
    fn handle_event(&self, event: &EnvironmentEvent) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(format!("{:?}", event));
        Ok(())
    }
}

fn registry_with(agents: &[&str]) -> ListenerRegistry {
    let store = Arc::new(RelationStore::new());
    for agent in agents {
        store.register_agent(agent).unwrap();
    }
    ListenerRegistry::new(store, 16)
}

#[test]
fn test_attach_agent_listener_requires_registration() {
    let registry = registry_with(&["a1"]);
    let listener: Arc<dyn AgentListener> = Recorder::new();

    let result = registry.attach_agent_listener("ghost", Arc::clone(&listener));
    assert!(matches!(result, Err(EnvError::UnknownAgent(_))));

    registry.attach_agent_listener("a1", listener).unwrap();
    assert_eq!(registry.agent_listeners("a1").len(), 1);
    assert!(registry.agent_listeners("ghost").is_empty());
}

#[test]
fn test_attach_after_unregister_discards_stale_listeners() {
    let store = Arc::new(RelationStore::new());
    store.register_agent("a1").unwrap();
    let registry = ListenerRegistry::new(Arc::clone(&store), 16);
    registry.attach_agent_listener("a1", Recorder::new()).unwrap();

    // Unregistered in the store before its listeners were dropped
    store.unregister_agent("a1").unwrap();
    let result = registry.attach_agent_listener("a1", Recorder::new());

    assert!(matches!(result, Err(EnvError::UnknownAgent(_))));
    assert!(registry.agent_listeners("a1").is_empty());
}

#[test]
fn test_attach_same_agent_listener_twice() {
    let registry = registry_with(&["a1"]);
    let listener: Arc<dyn AgentListener> = Recorder::new();

    registry
        .attach_agent_listener("a1", Arc::clone(&listener))
        .unwrap();
    registry
        .attach_agent_listener("a1", Arc::clone(&listener))
        .unwrap();

    assert_eq!(registry.agent_listeners("a1").len(), 1);
}

#[test]
fn test_detach_agent_listener() {
    let registry = registry_with(&["a1"]);
    let first: Arc<dyn AgentListener> = Recorder::new();
    let second: Arc<dyn AgentListener> = Recorder::new();

    registry.attach_agent_listener("a1", Arc::clone(&first)).unwrap();
    registry.attach_agent_listener("a1", Arc::clone(&second)).unwrap();

    registry.detach_agent_listener("a1", &first);
    let remaining = registry.agent_listeners("a1");
    assert_eq!(remaining.len(), 1);
    assert_eq!(
        Arc::as_ptr(&remaining[0]) as *const (),
        Arc::as_ptr(&second) as *const ()
    );

    // Absent listener and unknown agent are no-ops
    registry.detach_agent_listener("a1", &first);
    registry.detach_agent_listener("ghost", &first);
    assert_eq!(registry.agent_listeners("a1").len(), 1);
}

#[test]
fn test_environment_listeners_keep_order_and_dedupe() {
    let registry = registry_with(&[]);
    let first: Arc<dyn EnvironmentListener> = Recorder::new();
    let second: Arc<dyn EnvironmentListener> = Recorder::new();

    registry.attach_environment_listener(Arc::clone(&first));
    registry.attach_environment_listener(Arc::clone(&second));
    registry.attach_environment_listener(Arc::clone(&first));
    assert_eq!(registry.environment_listeners().len(), 2);

    registry.detach_environment_listener(&first);
    registry.detach_environment_listener(&first);
    assert_eq!(registry.environment_listeners().len(), 1);
}

#[test]
fn test_drop_agent_and_clear() {
    let registry = registry_with(&["a1", "a2"]);
    registry.attach_agent_listener("a1", Recorder::new()).unwrap();
    registry.attach_agent_listener("a2", Recorder::new()).unwrap();
    registry.attach_environment_listener(Recorder::new());

    registry.drop_agent("a1");
    assert!(registry.agent_listeners("a1").is_empty());
    assert_eq!(registry.agent_listeners("a2").len(), 1);

    registry.clear();
    assert!(registry.agent_listeners("a2").is_empty());
    assert!(registry.environment_listeners().is_empty());
}

#[test]
fn test_publish_event_reaches_subscribers() {
    let registry = registry_with(&[]);
    let mut rx = registry.subscribe_events();

    registry.publish_event(&EnvironmentEvent::EntityAdded {
        entity: "e1".to_string(),
    });

    assert_eq!(
        rx.try_recv().unwrap(),
        EnvironmentEvent::EntityAdded {
            entity: "e1".to_string()
        }
    );
}

#[test]
fn test_publish_without_subscribers_is_silent() {
    let registry = registry_with(&[]);
    registry.publish_event(&EnvironmentEvent::EntityDeleted {
        entity: "e1".to_string(),
    });
}

#[tokio::test]
async fn test_channel_listener_forwards_percepts() {
    let (listener, mut rx) = ChannelListener::new();

    listener
        .handle_percept("a1", &Percept::new("position", vec![]))
        .unwrap();

    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.agent, "a1");
    assert_eq!(delivery.percept.name, "position");
}

#[test]
fn test_channel_listener_fails_after_receiver_dropped() {
    let (listener, rx) = ChannelListener::new();
    drop(rx);

    let result = listener.handle_percept("a1", &Percept::new("position", vec![]));
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("a1"));
}
