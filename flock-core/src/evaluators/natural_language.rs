//! LLM-backed evaluator reading `field: value` lines from free text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{Evaluator, config_map, system_prompt};
use crate::agent::FlockAgent;
use crate::error::{FlockError, Result};
use crate::llm::{LLMProvider, Message};
use crate::parsing::{FieldParser, OutputParser, coerce_outputs};
use crate::tools::AgentTool;

/// Configuration for [`NaturalLanguageEvaluator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaturalLanguageConfig {
    pub temperature: f32,
    pub max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for NaturalLanguageConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            instructions: None,
        }
    }
}

/// Plain completion call whose answer is parsed by field label
pub struct NaturalLanguageEvaluator {
    provider: Arc<dyn LLMProvider>,
    config: NaturalLanguageConfig,
}

impl NaturalLanguageEvaluator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: NaturalLanguageConfig) -> Self {
        Self { provider, config }
    }

    fn user_prompt(inputs: &Map<String, Value>) -> String {
        inputs
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => format!("{}: {}", name, s),
                other => format!("{}: {}", name, other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl std::fmt::Debug for NaturalLanguageEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NaturalLanguageEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Evaluator for NaturalLanguageEvaluator {
    fn type_name(&self) -> &str {
        "natural_language"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    async fn evaluate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        _tools: &[AgentTool],
    ) -> Result<Map<String, Value>> {
        let signature = agent.output_signature();
        let mut format = String::from(
            "Answer with one section per output, each starting on a new line as `name: value`.",
        );
        if let Some(instructions) = &self.config.instructions {
            format.push_str("\n\n");
            format.push_str(instructions);
        }

        let text = self
            .provider
            .complete(
                agent.model(),
                vec![
                    Message::system(system_prompt(agent, &format)),
                    Message::user(Self::user_prompt(inputs)),
                ],
                Some(self.config.temperature),
                Some(self.config.max_tokens),
            )
            .await?;

        let parsed = FieldParser::new(signature.clone())
            .parse(&text)
            .map_err(|e| FlockError::evaluation(agent.name(), e.to_string()))?;
        coerce_outputs(&parsed, &signature)
            .map_err(|e| FlockError::evaluation(agent.name(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LLMRequest, LLMResponse};
    use serde_json::json;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl LLMProvider for FixedProvider {
        async fn generate_request(&self, _request: &LLMRequest) -> Result<LLMResponse> {
            Ok(LLMResponse {
                content: self.0.to_string(),
                usage: None,
            })
        }
    }

    fn agent() -> FlockAgent {
        FlockAgent::builder("critic")
            .input("draft")
            .output("verdict: str, score: int")
            .build()
    }

    #[tokio::test]
    async fn test_labelled_sections_parsed_and_coerced() {
        let evaluator = NaturalLanguageEvaluator::new(
            Arc::new(FixedProvider("Verdict: solid first draft\nScore: 7")),
            NaturalLanguageConfig::default(),
        );
        let out = evaluator.evaluate(&agent(), &Map::new(), &[]).await.unwrap();
        assert_eq!(Value::Object(out), json!({"verdict": "solid first draft", "score": 7}));
    }

    #[tokio::test]
    async fn test_missing_section_fails() {
        let evaluator = NaturalLanguageEvaluator::new(
            Arc::new(FixedProvider("verdict: fine")),
            NaturalLanguageConfig::default(),
        );
        let err = evaluator.evaluate(&agent(), &Map::new(), &[]).await.unwrap_err();
        assert!(err.to_string().contains("score"));
    }

    #[test]
    fn test_user_prompt_lines() {
        let mut inputs = Map::new();
        inputs.insert("draft".to_string(), json!("text"));
        inputs.insert("n".to_string(), json!(3));
        assert_eq!(NaturalLanguageEvaluator::user_prompt(&inputs), "draft: text\nn: 3");
    }
}
