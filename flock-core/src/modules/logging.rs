//! Module that traces an agent's lifecycle

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Module;
use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::evaluators::config_map;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingModuleConfig {
    pub enabled: bool,

    /// Include input values in the trace
    pub log_inputs: bool,

    /// Include output values in the trace
    pub log_outputs: bool,
}

impl Default for LoggingModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_inputs: true,
            log_outputs: true,
        }
    }
}

/// Emits `tracing` events at each hook
#[derive(Debug, Clone)]
pub struct LoggingModule {
    name: String,
    config: LoggingModuleConfig,
}

impl LoggingModule {
    pub fn new(name: impl Into<String>, config: LoggingModuleConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

impl Default for LoggingModule {
    fn default() -> Self {
        Self::new("logging", LoggingModuleConfig::default())
    }
}

#[async_trait]
impl Module for LoggingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "logging"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn pre_initialize(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        if self.config.log_inputs {
            let inputs = Value::Object(inputs.clone());
            tracing::info!(
                agent = %agent.name(),
                run_id = %context.run_id(),
                inputs = %inputs,
                "Agent starting"
            );
        } else {
            tracing::info!(agent = %agent.name(), run_id = %context.run_id(), "Agent starting");
        }
        Ok(())
    }

    async fn post_evaluate(
        &self,
        agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        result: Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        if self.config.log_outputs {
            let outputs = Value::Object(result.clone());
            tracing::debug!(
                agent = %agent.name(),
                run_id = %context.run_id(),
                outputs = %outputs,
                "Agent evaluated"
            );
        }
        Ok(result)
    }

    async fn post_terminate(
        &self,
        agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        result: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        tracing::info!(
            agent = %agent.name(),
            run_id = %context.run_id(),
            fields = result.len(),
            "Agent finished"
        );
        Ok(())
    }

    async fn on_error(
        &self,
        agent: &FlockAgent,
        error: &FlockError,
        _inputs: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        tracing::error!(
            agent = %agent.name(),
            run_id = %context.run_id(),
            kind = error.kind(),
            error = %error,
            "Agent failed"
        );
        Ok(())
    }
}
