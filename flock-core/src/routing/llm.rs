//! Router that asks a model to pick the next agent

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::decision::RouteDecision;
use super::{HandOffMode, HandOffRequest, Router, candidate_descriptions};
use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::llm::{LLMProvider, LLMRequest};
use crate::registry::Registry;

const SYSTEM_PROMPT: &str = "You route work between agents in a multi-agent system. \
Given the output of the agent that just finished and the available agents, choose the \
agent that should run next, or an empty string if the work is complete. Respond with a \
JSON object: {\"next_agent\": \"<name or empty>\", \"score\": <confidence 0.0-1.0>, \
\"reasoning\": \"<one sentence>\"}.";

/// Configuration for [`LlmRouter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmRouterConfig {
    /// Minimum score for a decision to be followed
    pub confidence_threshold: f64,

    pub temperature: f32,

    pub max_tokens: usize,

    /// Model override; defaults to the current agent's model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Extra routing instructions appended to the prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    pub hand_off_mode: HandOffMode,
}

impl Default for LlmRouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            temperature: 0.2,
            max_tokens: 500,
            model: None,
            instructions: None,
            hand_off_mode: HandOffMode::Match,
        }
    }
}

/// LLM-scored router
pub struct LlmRouter {
    config: LlmRouterConfig,
    provider: Arc<dyn LLMProvider>,
}

impl LlmRouter {
    pub fn new(provider: Arc<dyn LLMProvider>, config: LlmRouterConfig) -> Self {
        Self { config, provider }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.config.confidence_threshold = threshold;
        self
    }

    fn build_prompt(
        &self,
        current: &FlockAgent,
        result: &Map<String, Value>,
        candidates: &[Value],
    ) -> Result<String> {
        let mut prompt = format!(
            "Current agent: {}\nDescription: {}\nOutput:\n{}\n\nAvailable agents:\n{}\n",
            current.name(),
            current.description(),
            serde_json::to_string_pretty(result)?,
            serde_json::to_string_pretty(candidates)?,
        );
        if let Some(instructions) = &self.config.instructions {
            prompt.push_str("\nAdditional instructions: ");
            prompt.push_str(instructions);
            prompt.push('\n');
        }
        Ok(prompt)
    }
}

impl std::fmt::Debug for LlmRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmRouter")
            .field("config", &self.config)
            .field("provider", &self.provider.model_info().provider)
            .finish()
    }
}

#[async_trait]
impl Router for LlmRouter {
    fn type_name(&self) -> &str {
        "llm"
    }

    fn config(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    async fn route(
        &self,
        current: &FlockAgent,
        result: &Map<String, Value>,
        _context: &FlockContext,
        registry: &Registry,
    ) -> Result<HandOffRequest> {
        let candidates = candidate_descriptions(current.name(), registry);
        if candidates.is_empty() {
            tracing::info!(agent = %current.name(), "No candidate agents, terminating");
            return Ok(HandOffRequest::terminate());
        }

        let names: Vec<String> = candidates
            .iter()
            .filter_map(|c| c["name"].as_str().map(str::to_string))
            .collect();

        let request = LLMRequest::with_system_prompt(
            SYSTEM_PROMPT,
            self.build_prompt(current, result, &candidates)?,
        )
        .model(self.config.model.as_deref().or(current.model()))
        .temperature(self.config.temperature)
        .max_tokens(self.config.max_tokens);

        let response = self
            .provider
            .generate_request(&request)
            .await
            .map_err(|e| FlockError::routing(current.name(), e.to_string()))?;

        match RouteDecision::from_text(&response.content, &names) {
            Some(decision) => Ok(decision.into_hand_off(
                self.config.confidence_threshold,
                self.config.hand_off_mode,
                self.type_name(),
            )),
            None => {
                tracing::warn!(
                    agent = %current.name(),
                    response = %response.content,
                    "Could not read a routing decision, terminating"
                );
                Ok(HandOffRequest::terminate())
            }
        }
    }
}
