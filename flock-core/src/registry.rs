//! Agent and component registry
//!
//! The registry maps names to live objects: agents by name, hand-off
//! callables by name, tools by path reference, and component constructors
//! by the type name stored in serialized specs. Routers consult it to find
//! candidates and the orchestration loop uses it to resolve the next hop.
//!
//! Registries are plain values passed to whoever needs them, so tests and
//! independent runs can use isolated instances. [`Registry::global`] is a
//! process-wide convenience instance with the built-in components.
//!
//! Registration is expected at setup time; during runs the registry is
//! read-mostly.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::evaluators::{
    DeclarativeEvaluator, Evaluator, MemoryEvaluator, NaturalLanguageEvaluator, StubEvaluator,
};
use crate::llm::{LLMProvider, UnconfiguredProvider};
use crate::memory::{InMemoryBackend, MemoryBackend};
use crate::modules::{AssertionModule, LoggingModule, MemoryModule, Module};
use crate::routing::{
    AgentRouter, AgentRouterConfig, DefaultRouter, FeedbackRetryRouter, HandOffRequest, LlmRouter,
    Router,
};
use crate::serialization::{AgentSpec, ComponentSpec};
use crate::tools::{AgentTool, Capability, Tool, ToolPolicy, ToolReference, ToolRegistration};

/// A named function computing a hand-off from a result and the context
pub type HandOffCallable =
    Arc<dyn Fn(&Map<String, Value>, &FlockContext) -> HandOffRequest + Send + Sync>;

/// Builds an evaluator from its stored config
pub type EvaluatorFactory =
    Arc<dyn Fn(&Map<String, Value>, &Registry) -> Result<Arc<dyn Evaluator>> + Send + Sync>;

/// Builds a module from its name and stored config
pub type ModuleFactory =
    Arc<dyn Fn(&str, &Map<String, Value>, &Registry) -> Result<Arc<dyn Module>> + Send + Sync>;

/// Builds a router from its stored config
pub type RouterFactory =
    Arc<dyn Fn(&Map<String, Value>, &Registry) -> Result<Arc<dyn Router>> + Send + Sync>;

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::with_builtins);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Deserialize a component config, reporting failures as configuration errors
pub fn parse_config<T: DeserializeOwned>(type_name: &str, config: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(config.clone())).map_err(|e| {
        FlockError::Configuration(format!("invalid config for '{}': {}", type_name, e))
    })
}

/// Process-wide lookup of agents, callables, tools and component types
pub struct Registry {
    agents: RwLock<BTreeMap<String, Arc<FlockAgent>>>,
    callables: RwLock<HashMap<String, HandOffCallable>>,
    evaluators: RwLock<HashMap<String, EvaluatorFactory>>,
    modules: RwLock<HashMap<String, ModuleFactory>>,
    routers: RwLock<HashMap<String, RouterFactory>>,
    tools: RwLock<BTreeMap<ToolReference, ToolRegistration>>,
    tool_policy: RwLock<ToolPolicy>,
    llm: RwLock<Option<Arc<dyn LLMProvider>>>,
    memory: RwLock<Arc<dyn MemoryBackend>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Empty registry without component types
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
            callables: RwLock::new(HashMap::new()),
            evaluators: RwLock::new(HashMap::new()),
            modules: RwLock::new(HashMap::new()),
            routers: RwLock::new(HashMap::new()),
            tools: RwLock::new(BTreeMap::new()),
            tool_policy: RwLock::new(ToolPolicy::default()),
            llm: RwLock::new(None),
            memory: RwLock::new(Arc::new(InMemoryBackend::new())),
        }
    }

    /// Registry with every built-in evaluator, module and router type
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register_evaluator("stub", |config, _| {
            Ok(Arc::new(StubEvaluator::from_config(config)?))
        });
        registry.register_evaluator("declarative", |config, registry| {
            Ok(Arc::new(DeclarativeEvaluator::new(
                registry.llm_provider(),
                parse_config("declarative", config)?,
            )))
        });
        registry.register_evaluator("natural_language", |config, registry| {
            Ok(Arc::new(NaturalLanguageEvaluator::new(
                registry.llm_provider(),
                parse_config("natural_language", config)?,
            )))
        });
        registry.register_evaluator("memory", |config, registry| {
            Ok(Arc::new(MemoryEvaluator::new(
                registry.memory(),
                parse_config("memory", config)?,
            )))
        });

        registry.register_module("logging", |name, config, _| {
            Ok(Arc::new(LoggingModule::new(name, parse_config("logging", config)?)))
        });
        registry.register_module("assertion", |name, config, _| {
            Ok(Arc::new(AssertionModule::new(name, parse_config("assertion", config)?)))
        });
        registry.register_module("memory", |name, config, registry| {
            Ok(Arc::new(MemoryModule::new(
                name,
                registry.memory(),
                parse_config("memory", config)?,
            )))
        });

        registry.register_router("default", |config, _| {
            Ok(Arc::new(DefaultRouter::from_config(config)?))
        });
        registry.register_router("llm", |config, registry| {
            Ok(Arc::new(LlmRouter::new(
                registry.llm_provider(),
                parse_config("llm", config)?,
            )))
        });
        registry.register_router("agent", |config, registry| {
            let helper: AgentSpec = config
                .get("helper")
                .cloned()
                .ok_or_else(|| {
                    FlockError::Configuration("agent router needs a 'helper' agent".to_string())
                })
                .and_then(|helper| Ok(serde_json::from_value(helper)?))?;
            let helper = FlockAgent::from_spec(&helper, registry)?;
            let router_config: AgentRouterConfig = parse_config("agent", config)?;
            Ok(Arc::new(AgentRouter::new(Arc::new(helper), router_config)))
        });
        registry.register_router("feedback", |config, _| {
            Ok(Arc::new(FeedbackRetryRouter::new(parse_config("feedback", config)?)))
        });

        registry
    }

    /// Shared instance with the built-in component types
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    // Agents

    /// Register an agent, replacing any agent with the same name
    pub fn register_agent(&self, agent: impl Into<Arc<FlockAgent>>) {
        let agent = agent.into();
        tracing::debug!(agent = %agent.name(), "Registering agent");
        write(&self.agents).insert(agent.name().to_string(), agent);
    }

    pub fn get_agent(&self, name: &str) -> Option<Arc<FlockAgent>> {
        read(&self.agents).get(name).cloned()
    }

    pub fn remove_agent(&self, name: &str) -> Option<Arc<FlockAgent>> {
        write(&self.agents).remove(name)
    }

    /// All agents, ordered by name
    pub fn agents(&self) -> Vec<Arc<FlockAgent>> {
        read(&self.agents).values().cloned().collect()
    }

    pub fn agent_names(&self) -> Vec<String> {
        read(&self.agents).keys().cloned().collect()
    }

    // Hand-off callables

    pub fn register_callable<F>(&self, name: impl Into<String>, callable: F)
    where
        F: Fn(&Map<String, Value>, &FlockContext) -> HandOffRequest + Send + Sync + 'static,
    {
        write(&self.callables).insert(name.into(), Arc::new(callable));
    }

    pub fn get_callable(&self, name: &str) -> Option<HandOffCallable> {
        read(&self.callables).get(name).cloned()
    }

    // Component factories

    pub fn register_evaluator<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Map<String, Value>, &Registry) -> Result<Arc<dyn Evaluator>> + Send + Sync + 'static,
    {
        write(&self.evaluators).insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_module<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&str, &Map<String, Value>, &Registry) -> Result<Arc<dyn Module>>
            + Send
            + Sync
            + 'static,
    {
        write(&self.modules).insert(type_name.into(), Arc::new(factory));
    }

    pub fn register_router<F>(&self, type_name: impl Into<String>, factory: F)
    where
        F: Fn(&Map<String, Value>, &Registry) -> Result<Arc<dyn Router>> + Send + Sync + 'static,
    {
        write(&self.routers).insert(type_name.into(), Arc::new(factory));
    }

    pub fn create_evaluator(&self, spec: &ComponentSpec) -> Result<Arc<dyn Evaluator>> {
        let factory = read(&self.evaluators)
            .get(&spec.type_name)
            .cloned()
            .ok_or_else(|| unknown_type("evaluator", &spec.type_name))?;
        factory(&spec.config, self)
    }

    pub fn create_module(&self, name: &str, spec: &ComponentSpec) -> Result<Arc<dyn Module>> {
        let factory = read(&self.modules)
            .get(&spec.type_name)
            .cloned()
            .ok_or_else(|| unknown_type("module", &spec.type_name))?;
        factory(name, &spec.config, self)
    }

    pub fn create_router(&self, spec: &ComponentSpec) -> Result<Arc<dyn Router>> {
        // Factories may call back into the registry, so the lock is released first
        let factory = read(&self.routers)
            .get(&spec.type_name)
            .cloned()
            .ok_or_else(|| unknown_type("router", &spec.type_name))?;
        factory(&spec.config, self)
    }

    // Tools

    /// Register a tool under a `module::symbol` path with the capabilities it needs
    pub fn register_tool(
        &self,
        path: &str,
        capabilities: impl IntoIterator<Item = Capability>,
        tool: Arc<dyn Tool>,
    ) -> Result<()> {
        let reference = ToolReference::parse(path)?;
        let registration = ToolRegistration {
            reference: reference.clone(),
            capabilities: capabilities.into_iter().collect(),
            tool,
        };
        write(&self.tools).insert(reference, registration);
        Ok(())
    }

    /// Resolve a reference, applying the deny-list and capability policy
    pub fn resolve_tool(&self, reference: &ToolReference) -> Result<AgentTool> {
        let registration = read(&self.tools)
            .get(reference)
            .cloned()
            .ok_or_else(|| FlockError::Tool(format!("tool '{}' is not registered", reference)))?;

        if let Err(err) = read(&self.tool_policy).check(&registration) {
            tracing::warn!(tool = %reference, error = %err, "Tool reference refused");
            return Err(err);
        }
        Ok(AgentTool::new(registration.reference, registration.tool))
    }

    pub fn set_tool_policy(&self, policy: ToolPolicy) {
        *write(&self.tool_policy) = policy;
    }

    // Shared services

    /// Configured LLM provider, or one that fails every call
    pub fn llm_provider(&self) -> Arc<dyn LLMProvider> {
        read(&self.llm)
            .clone()
            .unwrap_or_else(|| Arc::new(UnconfiguredProvider))
    }

    pub fn set_llm_provider(&self, provider: Arc<dyn LLMProvider>) {
        *write(&self.llm) = Some(provider);
    }

    pub fn memory(&self) -> Arc<dyn MemoryBackend> {
        read(&self.memory).clone()
    }

    pub fn set_memory(&self, backend: Arc<dyn MemoryBackend>) {
        *write(&self.memory) = backend;
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut evaluators: Vec<String> = read(&self.evaluators).keys().cloned().collect();
        let mut routers: Vec<String> = read(&self.routers).keys().cloned().collect();
        evaluators.sort();
        routers.sort();

        f.debug_struct("Registry")
            .field("agents", &self.agent_names())
            .field("evaluators", &evaluators)
            .field("routers", &routers)
            .field("tools", &read(&self.tools).keys().map(|r| r.path().to_string()).collect::<Vec<_>>())
            .finish()
    }
}

fn unknown_type(kind: &str, type_name: &str) -> FlockError {
    FlockError::Configuration(format!("unknown {} type '{}'", kind, type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::ComponentSpec;
    use crate::tools::FnTool;
    use serde_json::json;

    fn spec(type_name: &str, config: Value) -> ComponentSpec {
        ComponentSpec::new(type_name, config.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_agents_replace_and_order() {
        let registry = Registry::new();
        registry.register_agent(FlockAgent::builder("b").build());
        registry.register_agent(FlockAgent::builder("a").description("first").build());
        registry.register_agent(FlockAgent::builder("a").description("second").build());

        assert_eq!(registry.agent_names(), vec!["a", "b"]);
        assert_eq!(registry.get_agent("a").unwrap().description(), "second");
        assert!(registry.get_agent("zzz").is_none());
        assert!(registry.remove_agent("b").is_some());
        assert_eq!(registry.agents().len(), 1);
    }

    #[test]
    fn test_isolated_registries() {
        let one = Registry::new();
        let two = Registry::new();
        one.register_agent(FlockAgent::builder("a").build());
        assert!(two.get_agent("a").is_none());
    }

    #[test]
    fn test_builtin_component_types() {
        let registry = Registry::with_builtins();

        for evaluator in ["stub", "declarative", "natural_language", "memory"] {
            let built = registry.create_evaluator(&spec(evaluator, json!({}))).unwrap();
            assert_eq!(built.type_name(), evaluator);
        }
        for module in ["logging", "assertion", "memory"] {
            let built = registry.create_module("m", &spec(module, json!({}))).unwrap();
            assert_eq!(built.type_name(), module);
            assert_eq!(built.name(), "m");
        }
        for (router, config) in [
            ("default", json!({"hand_off": "b"})),
            ("llm", json!({"confidence_threshold": 0.7})),
            ("feedback", json!({"max_retries": 1})),
            (
                "agent",
                json!({"helper": {"name": "helper", "evaluator": {"type": "stub"}}}),
            ),
        ] {
            let built = registry.create_router(&spec(router, config)).unwrap();
            assert_eq!(built.type_name(), router);
        }
    }

    #[test]
    fn test_unknown_type_and_bad_config() {
        let registry = Registry::with_builtins();
        assert!(matches!(
            registry.create_evaluator(&ComponentSpec::of("nope")),
            Err(FlockError::Configuration(_))
        ));
        assert!(matches!(
            registry.create_router(&spec("feedback", json!({"max_retries": "many"}))),
            Err(FlockError::Configuration(_))
        ));
        assert!(matches!(
            registry.create_router(&ComponentSpec::of("agent")),
            Err(FlockError::Configuration(_))
        ));
    }

    #[test]
    fn test_custom_evaluator_type() {
        let registry = Registry::new();
        registry.register_evaluator("echo", |_, _| Ok(Arc::new(StubEvaluator::new())));
        assert!(registry.create_evaluator(&ComponentSpec::of("echo")).is_ok());
    }

    #[test]
    fn test_callables() {
        let registry = Registry::new();
        registry.register_callable("always_b", |_result: &Map<String, Value>, _ctx: &FlockContext| {
            HandOffRequest::to("b")
        });

        let callable = registry.get_callable("always_b").unwrap();
        assert_eq!(callable(&Map::new(), &FlockContext::new()).next_agent, "b");
        assert!(registry.get_callable("missing").is_none());
    }

    #[test]
    fn test_tool_resolution_is_gated() {
        let registry = Registry::new();
        let echo = || Arc::new(FnTool::new("echo", |args: Value| Ok(args)));

        registry.register_tool("text::echo", [], echo()).unwrap();
        registry.register_tool("web::fetch", [Capability::Network], echo()).unwrap();
        registry.register_tool("std::process::run", [], echo()).unwrap();
        assert!(registry.register_tool("echo", [], echo()).is_err());

        let ok = registry.resolve_tool(&ToolReference::parse("text::echo").unwrap()).unwrap();
        assert_eq!(ok.name(), "echo");

        for denied in ["web::fetch", "std::process::run", "text::missing"] {
            let err = registry
                .resolve_tool(&ToolReference::parse(denied).unwrap())
                .unwrap_err();
            assert!(matches!(err, FlockError::Tool(_)), "{denied}");
        }
    }

    #[tokio::test]
    async fn test_unconfigured_llm_fails() {
        let registry = Registry::new();
        let err = registry
            .llm_provider()
            .generate(
                "hi",
                &crate::llm::LLMConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlockError::Configuration(_)));
    }

    #[test]
    fn test_global_has_builtins() {
        assert!(Registry::global().create_evaluator(&ComponentSpec::of("stub")).is_ok());
    }
}
