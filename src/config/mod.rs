use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete environment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvConfig {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity and initial entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Entities created (free) when the host starts
    #[serde(default)]
    pub entities: Vec<EntitySeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySeed {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

fn default_name() -> String {
    "agent-env".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            entities: Vec::new(),
        }
    }
}

/// Registry limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum registered agents; unlimited when absent
    #[serde(default)]
    pub max_agents: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Re-check entity ownership right before each handler invocation
    #[serde(default = "default_revalidate_targets")]
    pub revalidate_targets: bool,
}

fn default_revalidate_targets() -> bool {
    true
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            revalidate_targets: default_revalidate_targets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Buffer of the environment event broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_event_channel_capacity() -> usize {
    256
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "agent_env=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl EnvConfig {
    /// Override fields from AGENT_ENV_* env vars. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("AGENT_ENV_NAME") {
            self.environment.name = v;
        }
        if let Some(v) = var("AGENT_ENV_MAX_AGENTS") {
            if let Ok(n) = v.parse::<usize>() {
                self.registry.max_agents = Some(n);
            }
        }
        if let Some(v) = var("AGENT_ENV_REVALIDATE_TARGETS") {
            if let Ok(b) = v.parse::<bool>() {
                self.dispatch.revalidate_targets = b;
            }
        }
        if let Some(v) = var("AGENT_ENV_LOG_FILTER") {
            self.logging.filter = v;
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<EnvConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
    let config: EnvConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config file {}", path))?;
    Ok(config)
}
