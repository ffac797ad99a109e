//! Configuration types for Flock

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{FlockError, Result};
use crate::workflow::retry::RetryPolicy;

/// Model used by agents that do not declare one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Main configuration for a Flock
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    /// Model inherited by agents that leave `model` unset
    pub default_model: String,

    /// In-process execution settings
    pub execution: ExecutionConfig,

    /// Durable execution settings
    pub durable: DurableConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// LLM provider configuration (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<LLMProviderConfig>,

    /// Tool reference policy
    pub tools: ToolsConfig,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            execution: ExecutionConfig::default(),
            durable: DurableConfig::default(),
            logging: LoggingConfig::default(),
            llm: None,
            tools: ToolsConfig::default(),
        }
    }
}

/// In-process execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Stop a chain after this many agent runs (unbounded when unset)
    pub max_steps: Option<usize>,

    /// Maximum runs executing at once in `run_batch`
    pub batch_concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            batch_concurrency: 4,
        }
    }
}

/// Durable execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    /// Task queue activities are dispatched on
    pub task_queue: String,

    /// Per-activity timeout
    #[serde(with = "humantime_serde")]
    pub start_to_close_timeout: Duration,

    /// Workflow-level retry policy, used when an agent has none
    pub retry_policy: RetryPolicy,

    /// Per-agent activity overrides, keyed by agent name
    pub agents: BTreeMap<String, AgentActivityConfig>,
}

/// Activity settings for one agent. Unset fields use the workflow-level value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentActivityConfig {
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub start_to_close_timeout: Option<Duration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            task_queue: "flock-queue".to_string(),
            start_to_close_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::default(),
            agents: BTreeMap::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`)
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Tool reference policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Reference prefixes that can never be resolved
    pub denied_prefixes: Vec<String>,

    /// Allow tools that declare privileged capabilities
    pub allow_privileged: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            denied_prefixes: vec![
                "std::process".to_string(),
                "std::fs".to_string(),
                "os::".to_string(),
                "subprocess::".to_string(),
                "shell::".to_string(),
            ],
            allow_privileged: false,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Provider type
    pub provider: LLMProviderKind,

    /// Model name (empty uses the provider default)
    #[serde(default)]
    pub model: String,

    /// API key (if needed, prefer env vars)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL (for custom endpoints, e.g., Ollama)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// LLM provider type. All speak the OpenAI chat completions dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProviderKind {
    OpenAI,
    Ollama,
    Groq,
}

impl DurableConfig {
    /// Retry policy for `agent`, falling back to the workflow-level policy
    pub fn retry_policy_for(&self, agent: &str) -> &RetryPolicy {
        self.agents
            .get(agent)
            .and_then(|overrides| overrides.retry_policy.as_ref())
            .unwrap_or(&self.retry_policy)
    }

    /// Activity timeout for `agent`, falling back to the workflow-level timeout
    pub fn timeout_for(&self, agent: &str) -> Duration {
        self.agents
            .get(agent)
            .and_then(|overrides| overrides.start_to_close_timeout)
            .unwrap_or(self.start_to_close_timeout)
    }
}

impl FlockConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `flock.toml`, then the file named by `FLOCK_CONFIG_PATH`
    /// 3. `FLOCK_`-prefixed environment variables (`FLOCK_EXECUTION__MAX_STEPS=10`)
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(FlockConfig::default()))
            .merge(Toml::file("flock.toml"));

        if let Ok(path) = std::env::var("FLOCK_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: FlockConfig = figment
            .merge(Env::prefixed("FLOCK_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| FlockError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: FlockConfig = Figment::from(Serialized::defaults(FlockConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                FlockError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check value bounds that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.execution.batch_concurrency == 0 {
            return Err(FlockError::Configuration(
                "execution.batch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.execution.max_steps == Some(0) {
            return Err(FlockError::Configuration(
                "execution.max_steps must be at least 1 when set".to_string(),
            ));
        }
        if self.durable.start_to_close_timeout.is_zero() {
            return Err(FlockError::Configuration(
                "durable.start_to_close_timeout must be non-zero".to_string(),
            ));
        }
        if let Some(agent) = self
            .durable
            .agents
            .iter()
            .find(|(_, overrides)| overrides.start_to_close_timeout.is_some_and(|t| t.is_zero()))
            .map(|(name, _)| name)
        {
            return Err(FlockError::Configuration(format!(
                "durable.agents.{}.start_to_close_timeout must be non-zero",
                agent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FlockConfig::default();
        assert_eq!(config.default_model, DEFAULT_MODEL);
        assert_eq!(config.execution.batch_concurrency, 4);
        assert!(config.execution.max_steps.is_none());
        assert_eq!(config.durable.task_queue, "flock-queue");
        assert!(!config.tools.allow_privileged);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_merges_over_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
default_model = "llama3"

[execution]
max_steps = 12

[durable]
start_to_close_timeout = "45s"

[durable.retry_policy]
maximum_attempts = 7
initial_interval = "2s"

[durable.agents.writer]
start_to_close_timeout = "5s"

[durable.agents.writer.retry_policy]
maximum_attempts = 1

[llm]
provider = "ollama"
model = "llama3"
base_url = "http://localhost:11434/v1"
"#
        )
        .unwrap();

        let config = FlockConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.execution.max_steps, Some(12));
        assert_eq!(config.execution.batch_concurrency, 4);
        assert_eq!(config.durable.start_to_close_timeout, Duration::from_secs(45));
        assert_eq!(config.durable.retry_policy.maximum_attempts, 7);
        assert_eq!(config.durable.retry_policy.initial_interval, Duration::from_secs(2));
        assert_eq!(config.durable.retry_policy_for("writer").maximum_attempts, 1);
        assert_eq!(config.durable.retry_policy_for("editor").maximum_attempts, 7);
        assert_eq!(config.durable.timeout_for("writer"), Duration::from_secs(5));
        assert_eq!(config.durable.timeout_for("editor"), Duration::from_secs(45));
        assert_eq!(config.llm.unwrap().provider, LLMProviderKind::Ollama);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = FlockConfig::default();
        config.execution.batch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = FlockConfig::default();
        config.execution.max_steps = Some(0);
        assert!(config.validate().is_err());

        let mut config = FlockConfig::default();
        config.durable.agents.insert(
            "writer".to_string(),
            AgentActivityConfig {
                start_to_close_timeout: Some(Duration::ZERO),
                retry_policy: None,
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("durable.agents.writer"));
    }
}
