//! Rule-based retry router driven by assertion feedback

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{HandOffMode, HandOffRequest, Router};
use crate::agent::FlockAgent;
use crate::context::{FEEDBACK_KEY, FlockContext, RETRY_COUNT_PREFIX};
use crate::error::Result;
use crate::registry::Registry;

/// Configuration for [`FeedbackRetryRouter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackRetryConfig {
    /// Retries allowed per agent before giving up
    pub max_retries: u64,

    /// Agent to hand off to once retries are exhausted; terminates when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_agent: Option<String>,

    /// Agent to continue with when there is no feedback; terminates when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,

    /// Context key holding the feedback
    pub feedback_key: String,
}

impl Default for FeedbackRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fallback_agent: None,
            next_agent: None,
            feedback_key: FEEDBACK_KEY.to_string(),
        }
    }
}

/// Routes an agent back to itself while validation feedback is present.
///
/// On retry the feedback is passed as an extra `feedback` input and the
/// hand-off uses [`HandOffMode::Add`], so the agent also sees its previous
/// output. The per-agent counter lives in the context under
/// `flock.retry_count.{agent}` and is reset when the agent moves on.
#[derive(Debug, Clone, Default)]
pub struct FeedbackRetryRouter {
    config: FeedbackRetryConfig,
}

impl FeedbackRetryRouter {
    pub fn new(config: FeedbackRetryConfig) -> Self {
        Self { config }
    }

    pub fn counter_key(agent: &str) -> String {
        format!("{}.{}", RETRY_COUNT_PREFIX, agent)
    }

    fn feedback<'a>(&self, context: &'a FlockContext) -> Option<&'a Value> {
        context
            .get_variable(&self.config.feedback_key)
            .filter(|value| match value {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
                _ => true,
            })
    }

    fn moving_on(target: Option<&String>, counter_key: String, count: u64) -> HandOffRequest {
        let mut request = match target {
            Some(name) => HandOffRequest::to(name.clone()),
            None => HandOffRequest::terminate(),
        };
        if count > 0 {
            let mut reset = Map::new();
            reset.insert(counter_key, Value::from(0u64));
            request = request.with_context(reset);
        }
        request
    }
}

#[async_trait]
impl Router for FeedbackRetryRouter {
    fn type_name(&self) -> &str {
        "feedback"
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
        _result: &Map<String, Value>,
        context: &FlockContext,
        _registry: &Registry,
    ) -> Result<HandOffRequest> {
        let counter_key = Self::counter_key(current.name());
        let count = context
            .get_variable(&counter_key)
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let Some(feedback) = self.feedback(context) else {
            return Ok(Self::moving_on(self.config.next_agent.as_ref(), counter_key, count));
        };

        if count < self.config.max_retries {
            tracing::info!(
                agent = %current.name(),
                attempt = count + 1,
                max_retries = self.config.max_retries,
                "Retrying agent with feedback"
            );

            let mut input = Map::new();
            input.insert("feedback".to_string(), feedback.clone());
            let mut bump = Map::new();
            bump.insert(counter_key, Value::from(count + 1));

            return Ok(HandOffRequest::to(current.name())
                .with_mode(HandOffMode::Add)
                .with_input(input)
                .with_context(bump));
        }

        tracing::warn!(
            agent = %current.name(),
            max_retries = self.config.max_retries,
            fallback = ?self.config.fallback_agent,
            "Retries exhausted"
        );
        Ok(Self::moving_on(self.config.fallback_agent.as_ref(), counter_key, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(ctx: &mut FlockContext, request: &HandOffRequest) {
        if let Some(overrides) = &request.context {
            ctx.merge(overrides);
        }
    }

    #[tokio::test]
    async fn test_retry_bound_then_fallback() {
        let router = FeedbackRetryRouter::new(FeedbackRetryConfig {
            max_retries: 2,
            fallback_agent: Some("human_review".to_string()),
            ..Default::default()
        });
        let agent = FlockAgent::builder("writer").build();
        let registry = Registry::new();
        let mut ctx = FlockContext::new();
        ctx.set_variable(FEEDBACK_KEY, json!("too short"));

        let mut targets = Vec::new();
        for _ in 0..3 {
            let request = router.route(&agent, &Map::new(), &ctx, &registry).await.unwrap();
            apply(&mut ctx, &request);
            targets.push(request.next_agent.clone());
        }

        assert_eq!(targets, vec!["writer", "writer", "human_review"]);
        assert_eq!(
            ctx.get_variable(&FeedbackRetryRouter::counter_key("writer")),
            Some(&json!(0))
        );
    }

    #[tokio::test]
    async fn test_retry_carries_feedback_in_add_mode() {
        let router = FeedbackRetryRouter::default();
        let agent = FlockAgent::builder("writer").build();
        let mut ctx = FlockContext::new();
        ctx.set_variable(FEEDBACK_KEY, json!(["needs a title"]));

        let request = router
            .route(&agent, &Map::new(), &ctx, &Registry::new())
            .await
            .unwrap();
        assert_eq!(request.hand_off_mode, HandOffMode::Add);
        assert_eq!(request.input["feedback"], json!(["needs a title"]));
    }

    #[tokio::test]
    async fn test_no_feedback_moves_on() {
        let router = FeedbackRetryRouter::new(FeedbackRetryConfig {
            next_agent: Some("publisher".to_string()),
            ..Default::default()
        });
        let agent = FlockAgent::builder("writer").build();
        let mut ctx = FlockContext::new();
        ctx.set_variable(FEEDBACK_KEY, json!(""));

        let request = router
            .route(&agent, &Map::new(), &ctx, &Registry::new())
            .await
            .unwrap();
        assert_eq!(request.next_agent, "publisher");
        assert!(request.context.is_none());
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback_terminates() {
        let router = FeedbackRetryRouter::new(FeedbackRetryConfig {
            max_retries: 0,
            ..Default::default()
        });
        let agent = FlockAgent::builder("writer").build();
        let mut ctx = FlockContext::new();
        ctx.set_variable(FEEDBACK_KEY, json!("bad"));

        let request = router
            .route(&agent, &Map::new(), &ctx, &Registry::new())
            .await
            .unwrap();
        assert!(request.is_terminal());
    }
}
