// Concurrent callers against one shared environment: agent threads acting
// and re-binding entities while an engine thread broadcasts percepts.

use agent_env::{
    Action, ActionTable, AgentListener, EnvConfig, EnvError, Environment, Parameter, Percept,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

struct Counter {
    received: AtomicUsize,
}

impl AgentListener for Counter {
    fn handle_percept(&self, _agent: &str, _percept: &Percept) -> anyhow::Result<()> {
        self.received.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn shared_environment(agents: usize, entities: usize) -> Arc<Environment> {
    let mut table = ActionTable::new();
    table.register("noop", &[], |entity, _| Ok(Parameter::ident(entity)));
    let env = Arc::new(Environment::new(&EnvConfig::default(), table));
    for a in 0..agents {
        env.register_agent(&format!("a{}", a)).unwrap();
    }
    for e in 0..entities {
        env.add_entity(&format!("e{}", e)).unwrap();
    }
    env
}

#[test]
fn test_competing_associations_keep_single_owner() {
    let env = shared_environment(8, 16);

    let handles: Vec<_> = (0..8)
        .map(|a| {
            let env = Arc::clone(&env);
            thread::spawn(move || {
                let agent = format!("a{}", a);
                for round in 0..50 {
                    for e in 0..16 {
                        let entity = format!("e{}", e);
                        match env.associate_entity(&agent, &entity) {
                            Ok(()) | Err(EnvError::NotFree { .. }) => {}
                            Err(other) => panic!("unexpected error: {}", other),
                        }
                    }
                    if round % 2 == 0 {
                        env.free_agent(&agent).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen = HashSet::new();
    for agent in env.agents() {
        for entity in env.associated_entities(&agent).unwrap() {
            assert!(seen.insert(entity));
        }
    }
    for entity in env.free_entities() {
        assert!(seen.insert(entity));
    }
    assert_eq!(seen.len(), 16);
}

#[test]
fn test_act_while_engine_broadcasts() {
    let env = shared_environment(4, 4);
    let counters: Vec<Arc<Counter>> = (0..4)
        .map(|a| {
            let agent = format!("a{}", a);
            env.associate_entity(&agent, &format!("e{}", a)).unwrap();
            let counter = Arc::new(Counter {
                received: AtomicUsize::new(0),
            });
            env.attach_agent_listener(&agent, counter.clone()).unwrap();
            counter
        })
        .collect();

    let engine = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for tick in 0..100 {
                let percept = Percept::new("tick", vec![Parameter::num(tick)]);
                env.throw_event(&percept, &[]).unwrap();
            }
        })
    };

    let agents: Vec<_> = (0..4)
        .map(|a| {
            let env = Arc::clone(&env);
            thread::spawn(move || {
                let agent = format!("a{}", a);
                for _ in 0..100 {
                    let outcomes = env.act(&agent, &Action::new("noop", vec![]), &[]).unwrap();
                    assert_eq!(outcomes.len(), 1);
                    assert_eq!(outcomes[0].value, Parameter::ident(format!("e{}", a)));
                }
            })
        })
        .collect();

    engine.join().unwrap();
    for handle in agents {
        handle.join().unwrap();
    }

    for counter in &counters {
        assert_eq!(counter.received.load(Ordering::SeqCst), 100);
    }
}

#[test]
fn test_listener_may_reenter_environment() {
    struct Rebinder {
        env: Arc<Environment>,
    }

    impl AgentListener for Rebinder {
        fn handle_percept(&self, agent: &str, percept: &Percept) -> anyhow::Result<()> {
            if percept.name == "release" {
                self.env.free_agent(agent)?;
            }
            Ok(())
        }
    }

    let env = shared_environment(1, 2);
    env.associate_entity("a0", "e0").unwrap();
    env.associate_entity("a0", "e1").unwrap();
    env.attach_agent_listener(
        "a0",
        Arc::new(Rebinder {
            env: Arc::clone(&env),
        }),
    )
    .unwrap();

    let report = env
        .notify_agents(&Percept::new("release", vec![]), &["a0"])
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(env.free_entities(), vec!["e0", "e1"]);
}

#[test]
fn test_attach_racing_unregister_leaves_no_subscription() {
    for _ in 0..200 {
        let env = shared_environment(1, 0);
        let received = Arc::new(AtomicUsize::new(0));

        let attacher = {
            let env = Arc::clone(&env);
            let received = Arc::clone(&received);
            thread::spawn(move || loop {
                let listener = Arc::new(Shared {
                    received: Arc::clone(&received),
                });
                match env.attach_agent_listener("a0", listener) {
                    Ok(()) => continue,
                    Err(EnvError::UnknownAgent(_)) => break,
                    Err(other) => panic!("unexpected error: {}", other),
                }
            })
        };

        thread::yield_now();
        env.unregister_agent("a0").unwrap();
        attacher.join().unwrap();

        // A new session under the same name starts without listeners
        env.register_agent("a0").unwrap();
        let report = env
            .notify_agents(&Percept::new("tick", vec![]), &["a0"])
            .unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }
}

struct Shared {
    received: Arc<AtomicUsize>,
}

impl AgentListener for Shared {
    fn handle_percept(&self, _agent: &str, _percept: &Percept) -> anyhow::Result<()> {
        self.received.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
