//! Lifecycle modules wrapped around an agent's evaluator
//!
//! Hooks run once per enabled module, in registration order:
//!
//! ```text
//! pre_initialize -> post_initialize -> pre_evaluate -> [evaluate] -> post_evaluate
//!     -> pre_terminate -> post_terminate
//! ```
//!
//! `pre_evaluate` threads the inputs through every module and
//! `post_evaluate` threads the result the same way. The initialize and
//! terminate hooks are side effects only. When evaluation fails,
//! `on_error` runs for every enabled module; failures inside `on_error`
//! are logged and never replace the original error.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};

mod assertion;
mod logging;
mod memory;

pub use assertion::{AssertionModule, AssertionModuleConfig, AssertionRule};
pub use logging::{LoggingModule, LoggingModuleConfig};
pub use memory::{MemoryModule, MemoryModuleConfig};

/// An interceptor around an agent's execution. Every hook defaults to a no-op.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique name within an agent
    fn name(&self) -> &str;

    /// Type name used for serialization and factory lookup
    fn type_name(&self) -> &str;

    /// Serializable configuration, stored next to `type`
    fn config(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Disabled modules are skipped for every hook
    fn is_enabled(&self) -> bool {
        true
    }

    async fn pre_initialize(
        &self,
        _agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_initialize(
        &self,
        _agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn pre_evaluate(
        &self,
        _agent: &FlockAgent,
        inputs: Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        Ok(inputs)
    }

    async fn post_evaluate(
        &self,
        _agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        result: Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        Ok(result)
    }

    async fn pre_terminate(
        &self,
        _agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        _result: &Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn post_terminate(
        &self,
        _agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        _result: &Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<()> {
        Ok(())
    }

    async fn on_error(
        &self,
        _agent: &FlockAgent,
        _error: &FlockError,
        _inputs: &Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<()> {
        Ok(())
    }
}

/// Ordered set of modules, unique by name
#[derive(Clone, Default)]
pub struct ModuleChain {
    modules: Vec<Arc<dyn Module>>,
}

impl ModuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. A module with the same name is replaced in place.
    pub fn add(&mut self, module: Arc<dyn Module>) {
        match self.modules.iter().position(|m| m.name() == module.name()) {
            Some(index) => self.modules[index] = module,
            None => self.modules.push(module),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<dyn Module>> {
        let index = self.modules.iter().position(|m| m.name() == name)?;
        Some(self.modules.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Module>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    fn enabled(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.iter().filter(|m| m.is_enabled())
    }

    pub async fn pre_initialize(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        for module in self.enabled() {
            module
                .pre_initialize(agent, inputs, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "pre_initialize", e))?;
        }
        Ok(())
    }

    pub async fn post_initialize(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        for module in self.enabled() {
            module
                .post_initialize(agent, inputs, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "post_initialize", e))?;
        }
        Ok(())
    }

    pub async fn pre_evaluate(
        &self,
        agent: &FlockAgent,
        mut inputs: Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        for module in self.enabled() {
            inputs = module
                .pre_evaluate(agent, inputs, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "pre_evaluate", e))?;
        }
        Ok(inputs)
    }

    pub async fn post_evaluate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        mut result: Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        for module in self.enabled() {
            result = module
                .post_evaluate(agent, inputs, result, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "post_evaluate", e))?;
        }
        Ok(result)
    }

    pub async fn pre_terminate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        result: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        for module in self.enabled() {
            module
                .pre_terminate(agent, inputs, result, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "pre_terminate", e))?;
        }
        Ok(())
    }

    pub async fn post_terminate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        result: &Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<()> {
        for module in self.enabled() {
            module
                .post_terminate(agent, inputs, result, context)
                .await
                .map_err(|e| hook_error(module.as_ref(), "post_terminate", e))?;
        }
        Ok(())
    }

    /// Notify every enabled module. Hook failures are logged and dropped.
    pub async fn on_error(
        &self,
        agent: &FlockAgent,
        error: &FlockError,
        inputs: &Map<String, Value>,
        context: &mut FlockContext,
    ) {
        for module in self.enabled() {
            if let Err(hook_err) = module.on_error(agent, error, inputs, context).await {
                tracing::warn!(
                    agent = %agent.name(),
                    module = %module.name(),
                    error = %hook_err,
                    original = %error,
                    "on_error hook failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for ModuleChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.modules.iter().map(|m| m.name()))
            .finish()
    }
}

fn hook_error(module: &dyn Module, hook: &str, err: FlockError) -> FlockError {
    match err {
        FlockError::Module { .. } => err,
        other => FlockError::Module {
            module: module.name().to_string(),
            hook: hook.to_string(),
            message: other.to_string(),
        },
    }
}
