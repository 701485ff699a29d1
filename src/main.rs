use agent_env::{load_config, ActionTable, EnvConfig, Environment};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = match std::env::var("AGENT_ENV_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => EnvConfig::default(),
    };
    config.apply_env_overrides();

    // Initialize tracing subscriber
    let filter = config.logging.filter.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .init();

    info!(name = %config.environment.name, "agent-env starting...");

    // Domain actions are registered by embedding applications; the host
    // serves the registry with an empty vocabulary.
    let env = Arc::new(Environment::new(&config, ActionTable::new()));

    let mut events = env.subscribe_events();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(event = %json, "Environment event"),
                    Err(e) => warn!(error = %e, "Failed to encode environment event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    env.seed_entities(&config)
        .context("seeding configured entities")?;
    info!(
        entities = env.entities().len(),
        state = %env.state(),
        "Environment ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown signal received");
    let snapshot = serde_json::to_string(&env.snapshot()).context("encoding final relation")?;
    info!(relation = %snapshot, "Final relation");
    env.release();
    event_task.abort();

    Ok(())
}
