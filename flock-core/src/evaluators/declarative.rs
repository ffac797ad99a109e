//! LLM-backed evaluator producing structured JSON output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{Evaluator, config_map, system_prompt};
use crate::agent::FlockAgent;
use crate::error::{FlockError, Result};
use crate::llm::{LLMProvider, LLMRequest, Message};
use crate::parsing::{JsonParser, coerce_outputs};
use crate::tools::AgentTool;

/// Key a model uses to request a tool call instead of answering
const TOOL_CALL_KEY: &str = "tool_call";

/// Configuration for [`DeclarativeEvaluator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarativeConfig {
    pub temperature: f32,

    pub max_tokens: usize,

    /// Tool calls allowed before an answer is required
    pub max_tool_rounds: usize,

    /// Extra instructions appended to the system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Ask the provider for JSON-object mode
    pub json_mode: bool,
}

impl Default for DeclarativeConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1000,
            max_tool_rounds: 3,
            instructions: None,
            json_mode: true,
        }
    }
}

/// Asks the model for a JSON object with the agent's output fields.
///
/// When tools are attached the model may answer with
/// `{"tool_call": {"name": ..., "arguments": {...}}}`; the tool result is
/// fed back and the model is asked again, up to `max_tool_rounds` times.
/// The final object is validated and coerced against the output signature.
pub struct DeclarativeEvaluator {
    provider: Arc<dyn LLMProvider>,
    config: DeclarativeConfig,
    parser: JsonParser,
}

impl DeclarativeEvaluator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: DeclarativeConfig) -> Self {
        Self {
            provider,
            config,
            parser: JsonParser::new(),
        }
    }

    fn format_instructions(&self, agent: &FlockAgent, tools: &[AgentTool]) -> String {
        let names: Vec<String> = agent
            .output_signature()
            .names()
            .iter()
            .map(|n| format!("\"{}\"", n))
            .collect();
        let mut text = format!(
            "Respond only with a JSON object containing the keys {}.",
            names.join(", ")
        );

        if !tools.is_empty() {
            text.push_str("\n\nYou may call one of these tools before answering:\n");
            for tool in tools {
                text.push_str(&format!(
                    "- {}: {} (arguments schema: {})\n",
                    tool.name(),
                    tool.description(),
                    tool.parameters()
                ));
            }
            text.push_str(&format!(
                "To call a tool respond only with {{\"{}\": {{\"name\": \"<tool>\", \"arguments\": {{...}}}}}}.",
                TOOL_CALL_KEY
            ));
        }

        if let Some(instructions) = &self.config.instructions {
            text.push_str("\n\n");
            text.push_str(instructions);
        }
        text
    }

    fn request(&self, agent: &FlockAgent, messages: Vec<Message>) -> LLMRequest {
        let request = LLMRequest {
            messages,
            ..Default::default()
        }
        .model(agent.model())
        .temperature(self.config.temperature)
        .max_tokens(self.config.max_tokens);

        if self.config.json_mode { request.json() } else { request }
    }
}

impl std::fmt::Debug for DeclarativeEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclarativeEvaluator")
            .field("config", &self.config)
            .field("provider", &self.provider.model_info().provider)
            .finish()
    }
}

#[async_trait]
impl Evaluator for DeclarativeEvaluator {
    fn type_name(&self) -> &str {
        "declarative"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    async fn evaluate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        tools: &[AgentTool],
    ) -> Result<Map<String, Value>> {
        let mut messages = vec![
            Message::system(system_prompt(agent, &self.format_instructions(agent, tools))),
            Message::user(serde_json::to_string_pretty(inputs)?),
        ];
        let mut rounds = 0;

        loop {
            let response = self
                .provider
                .generate_request(&self.request(agent, messages.clone()))
                .await?;

            let object = self.parser.parse_object(&response.content).map_err(|e| {
                FlockError::evaluation(agent.name(), format!("unreadable model output: {}", e))
            })?;

            let tool_call = object.get(TOOL_CALL_KEY).filter(|_| !tools.is_empty());
            let Some(call) = tool_call else {
                return coerce_outputs(&object, &agent.output_signature())
                    .map_err(|e| FlockError::evaluation(agent.name(), e.to_string()));
            };

            if rounds >= self.config.max_tool_rounds {
                return Err(FlockError::evaluation(
                    agent.name(),
                    format!("exceeded {} tool rounds", self.config.max_tool_rounds),
                ));
            }
            rounds += 1;

            let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = call.get("arguments").cloned().unwrap_or(Value::Object(Map::new()));
            let reply = match AgentTool::find(tools, name) {
                Some(tool) => match tool.call(arguments).await {
                    Ok(value) => format!("Result of {}: {}", name, value),
                    Err(e) => format!("Tool {} failed: {}", name, e),
                },
                None => format!("Unknown tool '{}'. Answer with the output JSON instead.", name),
            };

            tracing::debug!(agent = %agent.name(), tool = %name, round = rounds, "Tool round");
            messages.push(Message::assistant(response.content));
            messages.push(Message::user(reply));
        }
    }
}
