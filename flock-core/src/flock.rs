//! The `Flock` facade: a set of agents and the settings to run them

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::agent::FlockAgent;
use crate::config::FlockConfig;
use crate::context::{FlockContext, INITIAL_INPUT_KEY};
use crate::error::{FlockError, Result};
use crate::llm::LLMProviderFactory;
use crate::registry::Registry;
use crate::serialization::FlockSpec;
use crate::tools::ToolPolicy;
use crate::workflow::{FlockWorkflow, RunResult, WorkflowEngine, WorkflowInput, run_local};

/// A named group of agents sharing a registry and configuration.
///
/// # Example
///
/// ```rust,no_run
/// use flock_core::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> flock_core::error::Result<()> {
/// let mut flock = Flock::new(FlockConfig::default());
/// flock.add_agent(
///     FlockAgent::builder("greeter")
///         .output("greeting: str")
///         .evaluator(Arc::new(StubEvaluator::new()))
///         .build(),
/// );
///
/// let run = flock.run("greeter", serde_json::Map::new()).await?;
/// println!("{:?}", run.result);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Flock {
    name: String,
    description: String,
    start_agent: Option<String>,
    config: FlockConfig,
    registry: Arc<Registry>,
}

impl Flock {
    /// Create a flock with its own registry of built-in components
    pub fn new(config: FlockConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::with_builtins()))
    }

    /// Create a flock around an existing registry
    pub fn with_registry(config: FlockConfig, registry: Arc<Registry>) -> Self {
        registry.set_tool_policy(ToolPolicy::from_config(&config.tools));
        Self {
            name: "flock".to_string(),
            description: String::new(),
            start_agent: None,
            config,
            registry,
        }
    }

    /// Create a flock and connect the LLM provider named in `config.llm`, if any
    pub fn from_config(config: FlockConfig) -> Result<Self> {
        let flock = Self::new(config);
        if let Some(provider) = LLMProviderFactory::from_config(flock.config.llm.as_ref())? {
            flock.registry.set_llm_provider(provider);
        }
        Ok(flock)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Agent runs start from when none is named
    pub fn start_agent(&self) -> Option<&str> {
        self.start_agent.as_deref()
    }

    pub fn set_start_agent(&mut self, name: impl Into<String>) {
        self.start_agent = Some(name.into());
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register an agent. Agents without a model get the flock's default model.
    pub fn add_agent(&mut self, mut agent: FlockAgent) -> Arc<FlockAgent> {
        if agent.model().is_none() {
            agent.set_model(self.config.default_model.clone());
        }
        let agent = Arc::new(agent);
        self.registry.register_agent(agent.clone());
        agent
    }

    pub fn agent(&self, name: &str) -> Option<Arc<FlockAgent>> {
        self.registry.get_agent(name)
    }

    pub fn agents(&self) -> Vec<Arc<FlockAgent>> {
        self.registry.agents()
    }

    /// Fresh context for one run, seeded with the initial input and the
    /// definitions of every registered agent
    fn new_context(&self, context: FlockContext, input: Map<String, Value>) -> FlockContext {
        let mut context = context;
        context.set_variable(INITIAL_INPUT_KEY, Value::Object(input));
        for agent in self.registry.agents() {
            context.add_agent_definition(agent.to_spec());
        }
        context
    }

    fn ensure_agent(&self, name: &str) -> Result<()> {
        if self.registry.get_agent(name).is_none() {
            return Err(FlockError::AgentNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Run a chain in-process from `start_agent`
    pub async fn run(&self, start_agent: &str, input: Map<String, Value>) -> Result<RunResult> {
        self.ensure_agent(start_agent)?;
        let context = self.new_context(FlockContext::new(), input);
        run_local(
            &self.registry,
            start_agent,
            context,
            self.config.execution.max_steps,
        )
        .await
    }

    /// Run a chain through a durable workflow engine
    pub async fn run_durable(
        &self,
        engine: &dyn WorkflowEngine,
        start_agent: &str,
        input: Map<String, Value>,
    ) -> Result<RunResult> {
        self.ensure_agent(start_agent)?;
        let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
        let workflow_id = format!("{}-{}", self.name, run_id);
        let context = self.new_context(
            FlockContext::with_identity(run_id, workflow_id, Utc::now()),
            input,
        );

        let handle = engine
            .start_workflow(
                FlockWorkflow::new(self.registry.clone()),
                WorkflowInput {
                    start_agent: start_agent.to_string(),
                    context,
                    durable: self.config.durable.clone(),
                    max_steps: self.config.execution.max_steps,
                },
            )
            .await?;
        handle.result().await
    }

    /// Run one independent chain per input, at most
    /// `execution.batch_concurrency` at a time. Results keep input order.
    pub async fn run_batch(
        &self,
        start_agent: &str,
        inputs: Vec<Map<String, Value>>,
    ) -> Result<Vec<Result<RunResult>>> {
        self.ensure_agent(start_agent)?;
        self.config.validate()?;
        let semaphore = Arc::new(tokio::sync::Semaphore::new(
            self.config.execution.batch_concurrency,
        ));

        let mut handles = Vec::with_capacity(inputs.len());
        for input in inputs {
            let permit = semaphore.clone().acquire_owned().await.map_err(|_| {
                FlockError::Configuration("batch semaphore closed".to_string())
            })?;
            let registry = self.registry.clone();
            let start_agent = start_agent.to_string();
            let context = self.new_context(FlockContext::new(), input);
            let max_steps = self.config.execution.max_steps;

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_local(&registry, &start_agent, context, max_steps).await
            }));
        }

        let results = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| Err(FlockError::Other(format!("batch run panicked: {}", e))))
            })
            .collect();
        Ok(results)
    }

    /// Serializable definition of the flock and all its agents
    pub fn to_spec(&self) -> FlockSpec {
        FlockSpec {
            name: self.name.clone(),
            model: Some(self.config.default_model.clone()),
            description: self.description.clone(),
            start_agent: self.start_agent.clone(),
            agents: self.registry.agents().iter().map(|a| a.to_spec()).collect(),
        }
    }

    /// Add the agents of `spec` to this flock.
    ///
    /// Tools and hand-off callables the agents reference must already be
    /// registered.
    pub fn load_spec(&mut self, spec: &FlockSpec) -> Result<()> {
        self.name = spec.name.clone();
        self.description = spec.description.clone();
        if let Some(model) = &spec.model {
            self.config.default_model = model.clone();
        }
        if spec.start_agent.is_some() {
            self.start_agent = spec.start_agent.clone();
        }
        for agent in &spec.agents {
            let agent = FlockAgent::from_spec(agent, &self.registry)?;
            self.add_agent(agent);
        }
        Ok(())
    }

    pub fn from_spec(spec: &FlockSpec, config: FlockConfig) -> Result<Self> {
        let mut flock = Self::new(config);
        flock.load_spec(spec)?;
        Ok(flock)
    }

    pub fn from_yaml(yaml: &str, config: FlockConfig) -> Result<Self> {
        Self::from_spec(&FlockSpec::from_yaml(yaml)?, config)
    }

    pub fn from_json(json: &str, config: FlockConfig) -> Result<Self> {
        Self::from_spec(&FlockSpec::from_json(json)?, config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        self.to_spec().to_yaml()
    }

    pub fn to_json(&self) -> Result<String> {
        self.to_spec().to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::StubEvaluator;
    use crate::routing::DefaultRouter;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn echo_flock() -> Flock {
        let mut flock = Flock::new(FlockConfig::default());
        flock.add_agent(
            FlockAgent::builder("echo")
                .input("text")
                .output("text")
                .evaluator(Arc::new(StubEvaluator::new()))
                .build(),
        );
        flock
    }

    #[test]
    fn test_default_model_applied() {
        let mut flock = Flock::new(FlockConfig::default());
        let plain = flock.add_agent(FlockAgent::builder("a").build());
        let pinned = flock.add_agent(FlockAgent::builder("b").model("llama3").build());

        assert_eq!(plain.model(), Some(crate::config::DEFAULT_MODEL));
        assert_eq!(pinned.model(), Some("llama3"));
    }

    #[tokio::test]
    async fn test_run_reads_initial_input() {
        let flock = echo_flock();
        let run = flock.run("echo", object(json!({"text": "hello"}))).await.unwrap();

        assert_eq!(run.result["text"], "hello");
        assert_eq!(
            run.context.get_variable(INITIAL_INPUT_KEY),
            Some(&json!({"text": "hello"}))
        );
        assert!(run.context.get_agent_definition("echo").is_some());
    }

    #[tokio::test]
    async fn test_unknown_start_agent() {
        let err = echo_flock().run("ghost", Map::new()).await.unwrap_err();
        assert!(matches!(err, FlockError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_batch_runs_are_isolated_and_ordered() {
        let flock = echo_flock();
        let inputs = (0..6).map(|i| object(json!({"text": format!("n{i}")}))).collect();

        let results = flock.run_batch("echo", inputs).await.unwrap();
        assert_eq!(results.len(), 6);
        for (i, result) in results.into_iter().enumerate() {
            let run = result.unwrap();
            assert_eq!(run.result["text"], format!("n{i}"));
            assert_eq!(run.context.history().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_batch_rejects_zero_concurrency() {
        let mut config = FlockConfig::default();
        config.execution.batch_concurrency = 0;
        let mut flock = Flock::new(config);
        flock.add_agent(
            FlockAgent::builder("echo")
                .input("text")
                .output("text")
                .evaluator(Arc::new(StubEvaluator::new()))
                .build(),
        );

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            flock.run_batch("echo", vec![object(json!({"text": "x"}))]),
        )
        .await
        .expect("run_batch returned");
        assert!(matches!(outcome, Err(FlockError::Configuration(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut flock = Flock::new(FlockConfig::default());
        flock.set_name("pair");
        flock.set_start_agent("a");
        flock.add_agent(
            FlockAgent::builder("a")
                .output("greeting: str")
                .evaluator(Arc::new(StubEvaluator::new()))
                .router(Arc::new(DefaultRouter::to("b")))
                .build(),
        );
        flock.add_agent(
            FlockAgent::builder("b")
                .input("greeting")
                .output("shout: str")
                .evaluator(Arc::new(StubEvaluator::new()))
                .build(),
        );

        let yaml = flock.to_yaml().unwrap();
        let back = Flock::from_yaml(&yaml, FlockConfig::default()).unwrap();

        assert_eq!(back.name(), "pair");
        assert_eq!(back.start_agent(), Some("a"));
        assert_eq!(back.to_spec(), flock.to_spec());
        assert_eq!(back.agent("a").unwrap().router().unwrap().type_name(), "default");
    }
}
