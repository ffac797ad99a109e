//! Static router following an agent's fixed hand-off

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{HandOffMode, HandOffRequest, Router};
use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::registry::{HandOffCallable, Registry};

/// The fixed target of a [`DefaultRouter`]
#[derive(Clone)]
pub enum StaticHandOff {
    /// Next agent by name
    Agent(String),
    /// A callable registered in the [`Registry`] under this name
    Callable(String),
    /// A prepared request, returned as-is
    Request(HandOffRequest),
}

/// Router that always returns the same hand-off, without calling a model
#[derive(Clone)]
pub struct DefaultRouter {
    hand_off: StaticHandOff,
    mode: HandOffMode,
}

impl DefaultRouter {
    pub fn new(hand_off: StaticHandOff) -> Self {
        Self {
            hand_off,
            mode: HandOffMode::Match,
        }
    }

    /// Route to the agent named `name`
    pub fn to(name: impl Into<String>) -> Self {
        Self::new(StaticHandOff::Agent(name.into()))
    }

    /// Route through the callable registered as `name`
    pub fn callable(name: impl Into<String>) -> Self {
        Self::new(StaticHandOff::Callable(name.into()))
    }

    pub fn request(request: HandOffRequest) -> Self {
        Self::new(StaticHandOff::Request(request))
    }

    pub fn with_mode(mut self, mode: HandOffMode) -> Self {
        self.mode = mode;
        self
    }

    /// Build from serialized config: `{"hand_off": "name"}`,
    /// `{"callable": "name"}` or `{"request": {...}}`, plus optional `hand_off_mode`.
    pub fn from_config(config: &Map<String, Value>) -> Result<Self> {
        let mode = match config.get("hand_off_mode") {
            Some(value) => serde_json::from_value(value.clone())?,
            None => HandOffMode::Match,
        };

        let hand_off = if let Some(name) = config.get("hand_off").and_then(Value::as_str) {
            StaticHandOff::Agent(name.to_string())
        } else if let Some(name) = config.get("callable").and_then(Value::as_str) {
            StaticHandOff::Callable(name.to_string())
        } else if let Some(request) = config.get("request") {
            StaticHandOff::Request(serde_json::from_value(request.clone())?)
        } else {
            return Err(FlockError::Configuration(
                "default router needs one of 'hand_off', 'callable' or 'request'".to_string(),
            ));
        };

        Ok(Self { hand_off, mode })
    }

    fn resolve_callable(&self, name: &str, registry: &Registry) -> Result<HandOffCallable> {
        registry.get_callable(name).ok_or_else(|| {
            FlockError::Configuration(format!("hand-off callable '{}' is not registered", name))
        })
    }
}

impl std::fmt::Debug for DefaultRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultRouter")
            .field("config", &self.config())
            .finish()
    }
}

#[async_trait]
impl Router for DefaultRouter {
    fn type_name(&self) -> &str {
        "default"
    }

    fn config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        match &self.hand_off {
            StaticHandOff::Agent(name) => {
                config.insert("hand_off".to_string(), Value::String(name.clone()));
            }
            StaticHandOff::Callable(name) => {
                config.insert("callable".to_string(), Value::String(name.clone()));
            }
            StaticHandOff::Request(request) => {
                let value = serde_json::to_value(request.clone().normalized())
                    .unwrap_or(Value::Null);
                config.insert("request".to_string(), value);
            }
        }
        if self.mode != HandOffMode::Match {
            config.insert(
                "hand_off_mode".to_string(),
                serde_json::to_value(self.mode).unwrap_or(Value::Null),
            );
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
        let request = match &self.hand_off {
            StaticHandOff::Agent(name) => HandOffRequest::to(name.clone()).with_mode(self.mode),
            StaticHandOff::Callable(name) => {
                let callable = self.resolve_callable(name, registry)?;
                callable(result, context)
            }
            StaticHandOff::Request(request) => request.clone(),
        };

        tracing::debug!(
            agent = %current.name(),
            next_agent = ?request.target(),
            "Static hand-off"
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_named_target() {
        let registry = Registry::new();
        let agent = FlockAgent::builder("a").build();
        let router = DefaultRouter::to("b");

        let request = router
            .route(&agent, &Map::new(), &FlockContext::new(), &registry)
            .await
            .unwrap();
        assert_eq!(request.next_agent, "b");
        assert_eq!(request.hand_off_mode, HandOffMode::Match);
    }

    #[tokio::test]
    async fn test_registered_callable() {
        let registry = Registry::new();
        registry.register_callable(
            "route_by_length",
            |result: &Map<String, Value>, _ctx: &FlockContext| {
                let long = result
                    .get("text")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.len() > 5);
                if long {
                    HandOffRequest::to("summarizer")
                } else {
                    HandOffRequest::terminate()
                }
            },
        );

        let agent = FlockAgent::builder("a").build();
        let router = DefaultRouter::callable("route_by_length");
        let ctx = FlockContext::new();

        let long = router
            .route(&agent, &object(json!({"text": "a long text"})), &ctx, &registry)
            .await
            .unwrap();
        assert_eq!(long.next_agent, "summarizer");

        let short = router
            .route(&agent, &object(json!({"text": "hi"})), &ctx, &registry)
            .await
            .unwrap();
        assert!(short.is_terminal());
    }

    #[tokio::test]
    async fn test_missing_callable_is_configuration_error() {
        let router = DefaultRouter::callable("nope");
        let agent = FlockAgent::builder("a").build();
        let err = router
            .route(&agent, &Map::new(), &FlockContext::new(), &Registry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FlockError::Configuration(_)));
    }

    #[test]
    fn test_config_round_trip() {
        let router = DefaultRouter::to("b").with_mode(HandOffMode::Add);
        let rebuilt = DefaultRouter::from_config(&router.config()).unwrap();
        assert_eq!(rebuilt.config(), router.config());

        let request = DefaultRouter::request(HandOffRequest::to("c").with_input(object(json!({"x": 1}))));
        let rebuilt = DefaultRouter::from_config(&request.config()).unwrap();
        assert_eq!(rebuilt.config()["request"]["input"]["x"], json!(1));
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(DefaultRouter::from_config(&Map::new()).is_err());
    }
}
