//! Router that delegates the decision to a helper agent
//!
//! The helper is a regular [`FlockAgent`] run through the full module and
//! evaluator lifecycle on a scratch copy of the context. Its output must
//! contain a `hand_off` object (or the decision fields at the top level).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::decision::RouteDecision;
use super::{HandOffMode, HandOffRequest, Router, candidate_descriptions};
use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::evaluators::Evaluator;
use crate::registry::Registry;

/// Input signature of the helper agent
pub const HELPER_INPUT: &str = "current_agent: str | Agent that just finished, \
current_result: dict | Its output, available_agents: list[dict] | Candidates with their signatures";

/// Output signature of the helper agent
pub const HELPER_OUTPUT: &str = "hand_off: dict | {next_agent: str; score: float; reasoning: str}";

/// Configuration for [`AgentRouter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentRouterConfig {
    pub confidence_threshold: f64,
    pub hand_off_mode: HandOffMode,
}

impl Default for AgentRouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            hand_off_mode: HandOffMode::Match,
        }
    }
}

/// Agent-delegated router
#[derive(Debug)]
pub struct AgentRouter {
    helper: Arc<FlockAgent>,
    config: AgentRouterConfig,
}

impl AgentRouter {
    /// Use an existing agent as the decision maker
    pub fn new(helper: Arc<FlockAgent>, config: AgentRouterConfig) -> Self {
        Self { helper, config }
    }

    /// Build the standard helper agent around `evaluator`
    pub fn with_evaluator(
        name: impl Into<String>,
        evaluator: Arc<dyn Evaluator>,
        config: AgentRouterConfig,
    ) -> Self {
        let helper = FlockAgent::builder(name)
            .description("Chooses the next agent for a finished step")
            .input(HELPER_INPUT)
            .output(HELPER_OUTPUT)
            .evaluator(evaluator)
            .build();
        Self::new(Arc::new(helper), config)
    }

    pub fn helper(&self) -> &FlockAgent {
        &self.helper
    }
}

#[async_trait]
impl Router for AgentRouter {
    fn type_name(&self) -> &str {
        "agent"
    }

    fn config(&self) -> Map<String, Value> {
        let mut config = match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        if let Ok(helper) = serde_json::to_value(self.helper.to_spec()) {
            config.insert("helper".to_string(), helper);
        }
        config
    }

    async fn route(
        &self,
        current: &FlockAgent,
        result: &Map<String, Value>,
        context: &FlockContext,
        registry: &Registry,
    ) -> Result<HandOffRequest> {
        let candidates: Vec<Value> = candidate_descriptions(current.name(), registry)
            .into_iter()
            .filter(|c| c["name"] != self.helper.name())
            .collect();
        if candidates.is_empty() {
            return Ok(HandOffRequest::terminate());
        }
        let names: Vec<String> = candidates
            .iter()
            .filter_map(|c| c["name"].as_str().map(str::to_string))
            .collect();

        let mut inputs = Map::new();
        inputs.insert("current_agent".to_string(), Value::String(current.name().to_string()));
        inputs.insert("current_result".to_string(), Value::Object(result.clone()));
        inputs.insert("available_agents".to_string(), Value::Array(candidates));

        // The helper's own writes must not leak into the routed run
        let mut scratch = context.deepcopy();
        let output = self
            .helper
            .run(inputs, &mut scratch)
            .await
            .map_err(|e| FlockError::routing(current.name(), format!("helper agent failed: {}", e)))?;

        let decision = RouteDecision::from_value(&Value::Object(output.clone())).or_else(|| {
            output
                .get("hand_off")
                .and_then(Value::as_str)
                .and_then(|text| RouteDecision::from_text(text, &names))
        });

        match decision {
            Some(decision) => Ok(decision.into_hand_off(
                self.config.confidence_threshold,
                self.config.hand_off_mode,
                self.type_name(),
            )),
            None => {
                tracing::warn!(
                    agent = %current.name(),
                    helper = %self.helper.name(),
                    "Helper agent returned no routing decision, terminating"
                );
                Ok(HandOffRequest::terminate())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::StubEvaluator;
    use serde_json::json;

    fn registry_with(names: &[&str]) -> Registry {
        let registry = Registry::new();
        for name in names {
            registry.register_agent(FlockAgent::builder(*name).output("text").build());
        }
        registry
    }

    fn router(decision: Value, threshold: f64) -> AgentRouter {
        let stub = StubEvaluator::new().with_response("hand_off", decision);
        AgentRouter::with_evaluator(
            "router_helper",
            Arc::new(stub),
            AgentRouterConfig {
                confidence_threshold: threshold,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_helper_decision_followed() {
        let registry = registry_with(&["a", "b"]);
        let current = registry.get_agent("a").unwrap();
        let router = router(json!({"next_agent": "b", "score": 0.8}), 0.6);

        let request = router
            .route(&current, &Map::new(), &FlockContext::new(), &registry)
            .await
            .unwrap();
        assert_eq!(request.next_agent, "b");
    }

    #[tokio::test]
    async fn test_helper_decision_gated() {
        let registry = registry_with(&["a", "b"]);
        let current = registry.get_agent("a").unwrap();
        let router = router(json!({"next_agent": "b", "score": 0.4}), 0.6);

        let request = router
            .route(&current, &Map::new(), &FlockContext::new(), &registry)
            .await
            .unwrap();
        assert!(request.is_terminal());
    }

    /// Reads `topic` from the context it is given, then writes over it
    struct Scribbler {
        seen: std::sync::Mutex<Option<Value>>,
    }

    #[async_trait]
    impl crate::modules::Module for Scribbler {
        fn name(&self) -> &str {
            "scribbler"
        }

        fn type_name(&self) -> &str {
            "scribbler"
        }

        async fn post_evaluate(
            &self,
            _agent: &FlockAgent,
            _inputs: &Map<String, Value>,
            result: Map<String, Value>,
            context: &mut FlockContext,
        ) -> Result<Map<String, Value>> {
            *self.seen.lock().unwrap() = context.get_variable("topic").cloned();
            context.set_variable("topic", json!("overwritten"));
            context.set_variable("scribbled", json!(true));
            Ok(result)
        }
    }

    #[tokio::test]
    async fn test_helper_writes_stay_in_scratch_context() {
        let registry = registry_with(&["a", "b"]);
        let current = registry.get_agent("a").unwrap();

        let scribbler = Arc::new(Scribbler {
            seen: std::sync::Mutex::new(None),
        });
        let helper = FlockAgent::builder("router_helper")
            .input(HELPER_INPUT)
            .output(HELPER_OUTPUT)
            .evaluator(Arc::new(
                StubEvaluator::new()
                    .with_response("hand_off", json!({"next_agent": "b", "score": 0.9})),
            ))
            .module(scribbler.clone())
            .build();
        let router = AgentRouter::new(Arc::new(helper), AgentRouterConfig::default());

        let mut ctx = FlockContext::new();
        ctx.set_variable("topic", json!("rust"));
        let version = ctx.version();

        let request = router.route(&current, &Map::new(), &ctx, &registry).await.unwrap();
        assert_eq!(request.next_agent, "b");

        // The helper ran against the caller's state
        assert_eq!(*scribbler.seen.lock().unwrap(), Some(json!("rust")));
        assert_eq!(ctx.get_variable("topic"), Some(&json!("rust")));
        assert!(!ctx.has_variable("scribbled"));
        assert_eq!(ctx.version(), version);
    }

    #[test]
    fn test_config_embeds_helper_spec() {
        let config = router(json!({}), 0.7).config();
        assert_eq!(config["confidence_threshold"], json!(0.7));
        assert_eq!(config["helper"]["name"], "router_helper");
        assert_eq!(config["helper"]["evaluator"]["type"], "stub");
    }
}
