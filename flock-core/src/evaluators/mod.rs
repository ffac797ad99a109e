//! Evaluators produce an agent's output from its resolved inputs
//!
//! An evaluator is the only component that does the actual work of an
//! agent: the LLM call, the memory lookup or a deterministic computation.
//! Errors propagate unmodified; the agent runs `on_error` module hooks
//! before re-raising them.
//!
//! Built-in variants, registered under their type names:
//!
//! | type               | evaluator                      |
//! |--------------------|--------------------------------|
//! | `declarative`      | [`DeclarativeEvaluator`]       |
//! | `natural_language` | [`NaturalLanguageEvaluator`]   |
//! | `memory`           | [`MemoryEvaluator`]            |
//! | `stub`             | [`StubEvaluator`]              |

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::agent::FlockAgent;
use crate::error::Result;
use crate::signature::Signature;
use crate::tools::AgentTool;

mod declarative;
mod memory;
mod natural_language;
mod stub;

pub use declarative::{DeclarativeConfig, DeclarativeEvaluator};
pub use memory::{MemoryEvaluator, MemoryEvaluatorConfig, MemoryMode};
pub use natural_language::{NaturalLanguageConfig, NaturalLanguageEvaluator};
pub use stub::StubEvaluator;

/// Pluggable strategy turning inputs into outputs
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Type name used for serialization and factory lookup
    fn type_name(&self) -> &str;

    /// Serializable configuration, stored next to `type`
    fn config(&self) -> Map<String, Value> {
        Map::new()
    }

    async fn evaluate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        tools: &[AgentTool],
    ) -> Result<Map<String, Value>>;
}

/// Serialize an evaluator config struct into its map form
pub(crate) fn config_map<T: serde::Serialize>(config: &T) -> Map<String, Value> {
    match serde_json::to_value(config) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Render a signature as one line per field for prompts
pub(crate) fn describe_fields(signature: &Signature) -> String {
    signature
        .fields()
        .iter()
        .map(|field| {
            let mut line = format!("- {}", field.name);
            if let Some(type_str) = &field.type_str {
                line.push_str(&format!(" ({})", type_str));
            }
            if let Some(description) = &field.description {
                line.push_str(&format!(": {}", description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Standard system prompt for LLM-backed evaluators
pub(crate) fn system_prompt(agent: &FlockAgent, format_instructions: &str) -> String {
    let mut prompt = String::new();
    if !agent.description().is_empty() {
        prompt.push_str(agent.description());
        prompt.push_str("\n\n");
    }
    let input = agent.input_signature();
    if !input.is_empty() {
        prompt.push_str("Inputs:\n");
        prompt.push_str(&describe_fields(&input));
        prompt.push_str("\n\n");
    }
    prompt.push_str("Produce these outputs:\n");
    prompt.push_str(&describe_fields(&agent.output_signature()));
    prompt.push_str("\n\n");
    prompt.push_str(format_instructions);
    prompt
}
