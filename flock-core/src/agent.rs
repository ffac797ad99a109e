//! Declarative agents
//!
//! A [`FlockAgent`] is declared by what it consumes and produces, not by a
//! prompt. Its `input` and `output` signatures drive input resolution from
//! the context and output validation; the attached [`Evaluator`] does the
//! work, wrapped by the agent's [`ModuleChain`]; the optional [`Router`]
//! decides what runs next.
//!
//! # Example
//!
//! ```rust
//! use flock_core::agent::FlockAgent;
//! use flock_core::evaluators::StubEvaluator;
//! use flock_core::routing::DefaultRouter;
//! use std::sync::Arc;
//!
//! let agent = FlockAgent::builder("writer")
//!     .description("Writes a short blog post")
//!     .input("topic: str | What to write about")
//!     .output("title: str, body: str")
//!     .evaluator(Arc::new(StubEvaluator::new()))
//!     .router(Arc::new(DefaultRouter::to("editor")))
//!     .build();
//!
//! assert_eq!(agent.output_signature().names(), vec!["title", "body"]);
//! ```

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::evaluators::Evaluator;
use crate::modules::{Module, ModuleChain};
use crate::registry::Registry;
use crate::routing::Router;
use crate::serialization::{AgentSpec, ComponentSpec, ModuleSpecs};
use crate::signature::Signature;
use crate::tools::AgentTool;

/// A named, declaratively typed unit of work wrapping one evaluator
#[derive(Clone)]
pub struct FlockAgent {
    name: String,
    model: Option<String>,
    description: String,
    input: String,
    output: String,
    evaluator: Option<Arc<dyn Evaluator>>,
    modules: ModuleChain,
    router: Option<Arc<dyn Router>>,
    tools: Vec<AgentTool>,
}

impl FlockAgent {
    pub fn builder(name: impl Into<String>) -> FlockAgentBuilder {
        FlockAgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Raw input signature
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Raw output signature
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn input_signature(&self) -> Signature {
        Signature::parse(&self.input)
    }

    pub fn output_signature(&self) -> Signature {
        Signature::parse(&self.output)
    }

    pub fn evaluator(&self) -> Option<&Arc<dyn Evaluator>> {
        self.evaluator.as_ref()
    }

    pub fn modules(&self) -> &ModuleChain {
        &self.modules
    }

    pub fn router(&self) -> Option<&Arc<dyn Router>> {
        self.router.as_ref()
    }

    pub fn tools(&self) -> &[AgentTool] {
        &self.tools
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn set_evaluator(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluator = Some(evaluator);
    }

    pub fn set_router(&mut self, router: Option<Arc<dyn Router>>) {
        self.router = router;
    }

    /// Add a module; one with the same name is replaced in place
    pub fn add_module(&mut self, module: Arc<dyn Module>) {
        self.modules.add(module);
    }

    /// Run the full lifecycle on already resolved `inputs`.
    ///
    /// Evaluator errors are passed to every enabled module's `on_error`
    /// hook and then returned unchanged.
    pub async fn run(
        &self,
        inputs: Map<String, Value>,
        context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        let evaluator = self
            .evaluator
            .as_ref()
            .ok_or_else(|| FlockError::MissingEvaluator(self.name.clone()))?;

        tracing::debug!(
            agent = %self.name,
            run_id = %context.run_id(),
            evaluator = %evaluator.type_name(),
            "Running agent"
        );

        self.modules.pre_initialize(self, &inputs, context).await?;
        self.modules.post_initialize(self, &inputs, context).await?;

        let inputs = self.modules.pre_evaluate(self, inputs, context).await?;

        let result = match evaluator.evaluate(self, &inputs, &self.tools).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(
                    agent = %self.name,
                    run_id = %context.run_id(),
                    error = %err,
                    "Evaluation failed"
                );
                self.modules.on_error(self, &err, &inputs, context).await;
                return Err(err);
            }
        };

        let result = self.modules.post_evaluate(self, &inputs, result, context).await?;

        self.modules.pre_terminate(self, &inputs, &result, context).await?;
        self.modules.post_terminate(self, &inputs, &result, context).await?;

        Ok(result)
    }

    /// Serializable definition
    pub fn to_spec(&self) -> AgentSpec {
        AgentSpec {
            name: self.name.clone(),
            model: self.model.clone(),
            description: self.description.clone(),
            input: self.input.clone(),
            output: self.output.clone(),
            evaluator: self
                .evaluator
                .as_ref()
                .map(|e| ComponentSpec::new(e.type_name(), e.config())),
            modules: ModuleSpecs(
                self.modules
                    .iter()
                    .map(|m| {
                        (
                            m.name().to_string(),
                            ComponentSpec::new(m.type_name(), m.config()),
                        )
                    })
                    .collect(),
            ),
            handoff_router: self
                .router
                .as_ref()
                .map(|r| ComponentSpec::new(r.type_name(), r.config())),
            tools: self.tools.iter().map(|t| t.reference().clone()).collect(),
        }
    }

    /// Rebuild an agent, resolving components and tools through `registry`
    pub fn from_spec(spec: &AgentSpec, registry: &Registry) -> Result<Self> {
        let mut builder = FlockAgent::builder(spec.name.clone())
            .description(spec.description.clone())
            .input(spec.input.clone())
            .output(spec.output.clone());

        if let Some(model) = &spec.model {
            builder = builder.model(model.clone());
        }
        if let Some(evaluator) = &spec.evaluator {
            builder = builder.evaluator(registry.create_evaluator(evaluator)?);
        }
        for (name, module) in spec.modules.iter() {
            builder = builder.module(registry.create_module(name, module)?);
        }
        if let Some(router) = &spec.handoff_router {
            builder = builder.router(registry.create_router(router)?);
        }
        for reference in &spec.tools {
            builder = builder.tool(registry.resolve_tool(reference)?);
        }

        Ok(builder.build())
    }
}

impl std::fmt::Debug for FlockAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlockAgent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("input", &self.input)
            .field("output", &self.output)
            .field("evaluator", &self.evaluator.as_ref().map(|e| e.type_name().to_string()))
            .field("modules", &self.modules)
            .field("router", &self.router.as_ref().map(|r| r.type_name().to_string()))
            .field("tools", &self.tools)
            .finish()
    }
}

/// Builder for [`FlockAgent`]
pub struct FlockAgentBuilder {
    agent: FlockAgent,
}

impl FlockAgentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            agent: FlockAgent {
                name: name.into(),
                model: None,
                description: String::new(),
                input: String::new(),
                output: String::new(),
                evaluator: None,
                modules: ModuleChain::new(),
                router: None,
                tools: Vec::new(),
            },
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.agent.model = Some(model.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.agent.description = description.into();
        self
    }

    pub fn input(mut self, signature: impl Into<String>) -> Self {
        self.agent.input = signature.into();
        self
    }

    pub fn output(mut self, signature: impl Into<String>) -> Self {
        self.agent.output = signature.into();
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.agent.evaluator = Some(evaluator);
        self
    }

    pub fn module(mut self, module: Arc<dyn Module>) -> Self {
        self.agent.modules.add(module);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.agent.router = Some(router);
        self
    }

    pub fn tool(mut self, tool: AgentTool) -> Self {
        self.agent.tools.push(tool);
        self
    }

    pub fn build(self) -> FlockAgent {
        self.agent
    }
}
