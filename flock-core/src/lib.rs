//! # Flock - Declarative Multi-Agent Orchestration
//!
//! Flock builds multi-agent systems from declarative agents. Each agent
//! declares what it consumes and produces as a signature string
//! (`"topic: str, tone: str | Writing style"`) and delegates the work to a
//! pluggable evaluator. Agents are chained by routers that pick the next
//! agent after each step, and every run shares one context holding state
//! and history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flock_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut flock = Flock::new(FlockConfig::default());
//!
//!     flock.add_agent(
//!         FlockAgent::builder("writer")
//!             .input("topic: str")
//!             .output("title: str, body: str")
//!             .evaluator(Arc::new(StubEvaluator::new()))
//!             .router(Arc::new(DefaultRouter::to("editor")))
//!             .build(),
//!     );
//!     flock.add_agent(
//!         FlockAgent::builder("editor")
//!             .input("title, body")
//!             .output("verdict: str")
//!             .evaluator(Arc::new(StubEvaluator::new()))
//!             .build(),
//!     );
//!
//!     let mut input = serde_json::Map::new();
//!     input.insert("topic".into(), "lifetimes".into());
//!
//!     let run = flock.run("writer", input).await?;
//!     println!("{:?}", run.result);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Agents** run a fixed lifecycle: module pre-hooks, evaluator, module post-hooks
//! - **Evaluators** produce outputs: LLM-backed, memory-backed or stubbed
//! - **Modules** intercept the lifecycle: logging, assertions, memory
//! - **Routers** choose the next agent: static, LLM-scored, agent-delegated, feedback retry
//! - **Context** holds namespaced state and the run history
//! - **Workflow** runs chains in-process or through a durable workflow engine
//!
//! ## Feature Flags
//!
//! - `llm-openai` (default): OpenAI-compatible HTTP provider (OpenAI, Ollama, Groq)

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluators;
pub mod flock;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod modules;
pub mod parsing;
pub mod registry;
pub mod routing;
pub mod serialization;
pub mod signature;
pub mod tools;
pub mod workflow;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{FlockAgent, FlockAgentBuilder};
    pub use crate::config::{
        AgentActivityConfig, DurableConfig, ExecutionConfig, FlockConfig, LLMProviderConfig, LLMProviderKind,
        LoggingConfig, ToolsConfig,
    };
    pub use crate::context::{FlockContext, RunRecord};
    pub use crate::error::{FlockError, Result};
    pub use crate::evaluators::{
        DeclarativeConfig, DeclarativeEvaluator, Evaluator, MemoryEvaluator,
        MemoryEvaluatorConfig, MemoryMode, NaturalLanguageConfig, NaturalLanguageEvaluator,
        StubEvaluator,
    };
    pub use crate::flock::Flock;
    pub use crate::llm::{
        LLMConfig, LLMProvider, LLMProviderFactory, LLMRequest, LLMResponse, Message, MessageRole,
    };
    pub use crate::logging::init_logging;
    pub use crate::memory::{InMemoryBackend, MemoryBackend, MemoryRecord};
    pub use crate::modules::{
        AssertionModule, AssertionRule, LoggingModule, MemoryModule, Module, ModuleChain,
    };
    pub use crate::registry::Registry;
    pub use crate::routing::{
        AgentRouter, DefaultRouter, FeedbackRetryConfig, FeedbackRetryRouter, HandOffMode,
        HandOffRequest, LlmRouter, LlmRouterConfig, Router,
    };
    pub use crate::serialization::{AgentSpec, ComponentSpec, FlockSpec};
    pub use crate::signature::{Signature, SignatureField};
    pub use crate::tools::{
        AgentTool, Capability, CapabilityPolicy, FnTool, Tool, ToolPolicy, ToolReference,
    };
    pub use crate::workflow::{
        ChainState, LocalWorkflowEngine, RetryPolicy, RunResult, WorkflowEngine,
    };
}
