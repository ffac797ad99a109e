//! Routers decide which agent runs next
//!
//! After an agent finishes, its router returns a [`HandOffRequest`]: the
//! name of the next agent (empty to stop), how the next agent's inputs are
//! built ([`HandOffMode`]), explicit input overrides and optional state to
//! merge into the context first.
//!
//! Built-in routers:
//!
//! - [`DefaultRouter`]: a fixed target (name, registered callable or request)
//! - [`LlmRouter`]: asks a model to score candidates, gated by confidence
//! - [`AgentRouter`]: delegates the decision to a helper agent
//! - [`FeedbackRetryRouter`]: retries an agent while assertion feedback exists

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::Result;
use crate::registry::Registry;

mod agent;
mod decision;
mod default;
mod feedback;
mod llm;

pub use agent::{AgentRouter, AgentRouterConfig};
pub use decision::RouteDecision;
pub use default::{DefaultRouter, StaticHandOff};
pub use feedback::{FeedbackRetryRouter, FeedbackRetryConfig};
pub use llm::{LlmRouter, LlmRouterConfig};

/// How the next agent's input is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandOffMode {
    /// Inputs are resolved from the context by name
    #[default]
    Match,
    /// The current agent's output fields are appended to the next agent's input signature
    Add,
}

/// A router decision
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct HandOffRequest {
    /// Next agent by name; empty terminates the chain
    #[serde(default)]
    pub next_agent: String,

    #[serde(default)]
    pub hand_off_mode: HandOffMode,

    /// Explicit inputs for the next agent, taking precedence over the context
    #[serde(default)]
    pub input: Map<String, Value>,

    /// State merged into the context before the next agent runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,

    /// In-process target given by object rather than name.
    /// Replaced by its name before the decision is persisted.
    #[serde(skip)]
    pub agent: Option<Arc<FlockAgent>>,
}

impl HandOffRequest {
    /// Hand off to the agent named `next_agent`
    pub fn to(next_agent: impl Into<String>) -> Self {
        Self {
            next_agent: next_agent.into(),
            ..Default::default()
        }
    }

    /// Stop the chain
    pub fn terminate() -> Self {
        Self::default()
    }

    /// Hand off to an agent object
    pub fn to_agent(agent: Arc<FlockAgent>) -> Self {
        Self {
            agent: Some(agent),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: HandOffMode) -> Self {
        self.hand_off_mode = mode;
        self
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Name of the target, whether given by name or by object
    pub fn target(&self) -> Option<&str> {
        if !self.next_agent.is_empty() {
            return Some(&self.next_agent);
        }
        self.agent.as_deref().map(FlockAgent::name)
    }

    /// True when the chain should stop
    pub fn is_terminal(&self) -> bool {
        self.target().is_none()
    }

    /// Replace an agent object target with its name
    pub fn normalized(mut self) -> Self {
        if let Some(agent) = self.agent.take() {
            if self.next_agent.is_empty() {
                self.next_agent = agent.name().to_string();
            }
        }
        self
    }
}

impl std::fmt::Debug for HandOffRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandOffRequest")
            .field("next_agent", &self.next_agent)
            .field("hand_off_mode", &self.hand_off_mode)
            .field("input", &self.input)
            .field("context", &self.context)
            .field("agent", &self.agent.as_ref().map(|a| a.name().to_string()))
            .finish()
    }
}

/// Strategy deciding the next agent after `current` produced `result`
#[async_trait]
pub trait Router: Send + Sync {
    /// Type name used to rebuild the router from its serialized form
    fn type_name(&self) -> &str;

    /// Serializable configuration (without the type name)
    fn config(&self) -> Map<String, Value> {
        Map::new()
    }

    async fn route(
        &self,
        current: &FlockAgent,
        result: &Map<String, Value>,
        context: &FlockContext,
        registry: &Registry,
    ) -> Result<HandOffRequest>;
}

/// Describe every registered agent except `current` for a routing prompt
pub(crate) fn candidate_descriptions(current: &str, registry: &Registry) -> Vec<Value> {
    registry
        .agents()
        .into_iter()
        .filter(|agent| agent.name() != current)
        .map(|agent| {
            serde_json::json!({
                "name": agent.name(),
                "description": agent.description(),
                "input": agent.input(),
                "output": agent.output(),
            })
        })
        .collect()
}
