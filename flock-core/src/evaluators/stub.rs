//! Deterministic evaluator for tests and dry runs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};

use super::{Evaluator, config_map};
use crate::agent::FlockAgent;
use crate::error::{FlockError, Result};
use crate::signature::SignatureField;
use crate::tools::AgentTool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StubConfig {
    /// Canned values keyed by output field name
    responses: Map<String, Value>,

    /// Fail every call with this message
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    /// Fail only the first N calls, then succeed
    #[serde(skip_serializing_if = "is_zero")]
    fail_times: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Returns canned values for each declared output field.
///
/// Fields without a canned response echo a same-named input if one exists,
/// and otherwise get a default derived from the declared type (`0`, `0.0`,
/// `false`, `[]`, `{}`, or `"{agent}.{field}"` for strings and untyped
/// fields).
#[derive(Debug, Default)]
pub struct StubEvaluator {
    config: StubConfig,
    calls: AtomicU32,
}

impl StubEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a stored config
    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let config: StubConfig = serde_json::from_value(Value::Object(config.clone()))?;
        Ok(Self {
            config,
            calls: AtomicU32::new(0),
        })
    }

    pub fn with_response(mut self, field: impl Into<String>, value: Value) -> Self {
        self.config.responses.insert(field.into(), value);
        self
    }

    /// Fail every evaluation with `message`
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.config.error = Some(message.into());
        self
    }

    /// Fail the first `times` evaluations, then behave normally
    pub fn failing_times(mut self, times: u32) -> Self {
        self.config.fail_times = times;
        self
    }

    /// Number of evaluations so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn default_for(agent: &str, field: &SignatureField) -> Value {
        match field.base_type().as_deref() {
            Some("int" | "integer") => Value::from(0),
            Some("float" | "number") => Value::from(0.0),
            Some("bool" | "boolean") => Value::Bool(false),
            Some("list" | "tuple" | "set") => Value::Array(Vec::new()),
            Some("dict" | "object") => Value::Object(Map::new()),
            _ => Value::String(format!("{}.{}", agent, field.name)),
        }
    }
}

#[async_trait]
impl Evaluator for StubEvaluator {
    fn type_name(&self) -> &str {
        "stub"
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
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(message) = &self.config.error {
            return Err(FlockError::evaluation(agent.name(), message.clone()));
        }
        if call <= self.config.fail_times {
            return Err(FlockError::evaluation(
                agent.name(),
                format!("scripted failure {} of {}", call, self.config.fail_times),
            ));
        }

        let output = agent
            .output_signature()
            .fields()
            .iter()
            .map(|field| {
                let value = self
                    .config
                    .responses
                    .get(&field.name)
                    .or_else(|| inputs.get(&field.name))
                    .cloned()
                    .unwrap_or_else(|| Self::default_for(agent.name(), field));
                (field.name.clone(), value)
            })
            .collect();
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn agent() -> FlockAgent {
        FlockAgent::builder("a")
            .input("topic")
            .output("topic, n: int, ok: bool, tags: list[str], text: str, extra")
            .build()
    }

    #[tokio::test]
    async fn test_canned_echo_and_typed_defaults() {
        let stub = StubEvaluator::new().with_response("text", json!("hello"));
        let mut inputs = Map::new();
        inputs.insert("topic".to_string(), json!("rust"));

        let out = stub.evaluate(&agent(), &inputs, &[]).await.unwrap();
        assert_eq!(
            Value::Object(out),
            json!({
                "topic": "rust",
                "n": 0,
                "ok": false,
                "tags": [],
                "text": "hello",
                "extra": "a.extra"
            })
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let stub = StubEvaluator::new().with_error("boom");
        let err = stub.evaluate(&agent(), &Map::new(), &[]).await.unwrap_err();
        assert!(matches!(err, FlockError::Evaluation { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_failing_times_then_succeeds() {
        let stub = StubEvaluator::new().failing_times(2);
        assert!(stub.evaluate(&agent(), &Map::new(), &[]).await.is_err());
        assert!(stub.evaluate(&agent(), &Map::new(), &[]).await.is_err());
        assert!(stub.evaluate(&agent(), &Map::new(), &[]).await.is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let stub = StubEvaluator::new()
            .with_response("text", json!("hi"))
            .failing_times(1);
        let config = stub.config();
        assert_eq!(Value::Object(config.clone()), json!({"responses": {"text": "hi"}, "fail_times": 1}));

        let rebuilt = StubEvaluator::from_config(&config).unwrap();
        assert_eq!(rebuilt.config(), config);
    }
}
