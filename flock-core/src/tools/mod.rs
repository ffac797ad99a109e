//! Tools exposed to evaluators
//!
//! Tools are referenced by path (`"module::symbol"`) rather than serialized
//! as code. A reference is only resolved through the [`Registry`], which
//! refuses denied path prefixes and tools whose declared capabilities the
//! [`ToolPolicy`] does not allow.
//!
//! [`Registry`]: crate::registry::Registry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::error::{FlockError, Result};

pub mod capability;

pub use capability::{Capability, CapabilityPolicy, CapabilitySet};

/// A callable an evaluator may invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn description(&self) -> &str;

    /// JSON Schema of the arguments object
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn call(&self, args: Value) -> Result<Value>;
}

/// A tool backed by a synchronous closure
pub struct FnTool<F> {
    description: String,
    parameters: Value,
    func: F,
}

impl<F> FnTool<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            description: description.into(),
            parameters: serde_json::json!({"type": "object"}),
            func,
        }
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, args: Value) -> Result<Value> {
        (self.func)(args)
    }
}

/// Path reference to a registered tool, e.g. `web::search`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolReference {
    path: String,
}

impl ToolReference {
    /// Parse a `module::symbol` path. Every segment must be an identifier.
    pub fn parse(path: &str) -> Result<Self> {
        let path = path.trim();
        let segments: Vec<&str> = path.split("::").collect();
        let valid = segments.len() >= 2
            && segments.iter().all(|segment| {
                let mut chars = segment.chars();
                matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            });

        if !valid {
            return Err(FlockError::Tool(format!(
                "invalid tool reference '{}', expected 'module::symbol'",
                path
            )));
        }
        Ok(Self {
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Everything before the last `::`
    pub fn module(&self) -> &str {
        self.path.rsplit_once("::").map(|(m, _)| m).unwrap_or_default()
    }

    /// The last segment
    pub fn symbol(&self) -> &str {
        self.path.rsplit_once("::").map(|(_, s)| s).unwrap_or(&self.path)
    }
}

impl TryFrom<String> for ToolReference {
    type Error = FlockError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ToolReference> for String {
    fn from(reference: ToolReference) -> Self {
        reference.path
    }
}

impl std::fmt::Display for ToolReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}

/// A tool as registered, with its declared capabilities
#[derive(Clone)]
pub struct ToolRegistration {
    pub reference: ToolReference,
    pub capabilities: CapabilitySet,
    pub tool: Arc<dyn Tool>,
}

/// A resolved tool attached to an agent
#[derive(Clone)]
pub struct AgentTool {
    reference: ToolReference,
    tool: Arc<dyn Tool>,
}

impl AgentTool {
    pub fn new(reference: ToolReference, tool: Arc<dyn Tool>) -> Self {
        Self { reference, tool }
    }

    /// Name shown to models (the symbol)
    pub fn name(&self) -> &str {
        self.reference.symbol()
    }

    pub fn reference(&self) -> &ToolReference {
        &self.reference
    }

    pub fn description(&self) -> &str {
        self.tool.description()
    }

    pub fn parameters(&self) -> Value {
        self.tool.parameters()
    }

    pub async fn call(&self, args: Value) -> Result<Value> {
        tracing::debug!(tool = %self.reference, "Invoking tool");
        self.tool.call(args).await
    }

    /// Find a tool by symbol or full path
    pub fn find<'a>(tools: &'a [AgentTool], name: &str) -> Option<&'a AgentTool> {
        tools
            .iter()
            .find(|t| t.reference.path() == name)
            .or_else(|| tools.iter().find(|t| t.name() == name))
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("reference", &self.reference.path())
            .finish()
    }
}

/// Gate applied when a tool reference is resolved
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    denied_prefixes: Vec<String>,
    capabilities: CapabilityPolicy,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

impl ToolPolicy {
    pub fn new(denied_prefixes: Vec<String>, capabilities: CapabilityPolicy) -> Self {
        Self {
            denied_prefixes,
            capabilities,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        let capabilities = if config.allow_privileged {
            CapabilityPolicy::allow_all()
        } else {
            CapabilityPolicy::safe_only()
        };
        Self::new(config.denied_prefixes.clone(), capabilities)
    }

    pub fn is_denied_path(&self, reference: &ToolReference) -> bool {
        self.denied_prefixes
            .iter()
            .any(|prefix| reference.path().starts_with(prefix.as_str()))
    }

    pub fn check(&self, registration: &ToolRegistration) -> Result<()> {
        if self.is_denied_path(&registration.reference) {
            return Err(FlockError::Tool(format!(
                "tool reference '{}' is on the deny-list",
                registration.reference
            )));
        }
        self.capabilities
            .check_all(&registration.capabilities)
            .map_err(|denied| {
                FlockError::Tool(format!(
                    "tool '{}' requires denied capabilities {}",
                    registration.reference, denied
                ))
            })
    }
}
