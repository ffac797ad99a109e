//! The two units of work every chain is made of
//!
//! A chain alternates between executing one agent and asking that agent's
//! router for the next one. Both execution modes call the functions here,
//! so in-process and durable runs produce the same history for the same
//! chain. The durable mode wraps them as [`Activity`] values whose payloads
//! are plain JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::durable::Activity;
use crate::agent::FlockAgent;
use crate::context::{CURRENT_AGENT_KEY, FlockContext};
use crate::error::{FlockError, Result};
use crate::registry::Registry;
use crate::routing::HandOffMode;
use crate::signature::Signature;

pub const EXECUTE_AGENT: &str = "execute_agent";
pub const DETERMINE_NEXT_AGENT: &str = "determine_next_agent";

/// The agent a chain runs next and how its inputs are assembled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextStep {
    pub agent: String,

    /// Explicit inputs, taking precedence over the context
    #[serde(default)]
    pub input: Map<String, Value>,

    /// Fields appended to the agent's input signature for this run only
    #[serde(default)]
    pub extra_fields: Vec<String>,

    /// Agent whose router chose this step; empty for the start agent
    #[serde(default)]
    pub called_from: String,
}

impl NextStep {
    /// First step of a chain
    pub fn start(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            ..Default::default()
        }
    }

    /// The agent's declared input signature plus the appended fields
    pub fn effective_signature(&self, agent: &FlockAgent) -> Signature {
        let mut signature = agent.input_signature();
        signature.extend_names(self.extra_fields.iter().map(String::as_str));
        signature
    }
}

/// Find an agent by name: the registry first, then the definitions carried
/// by the context.
pub fn lookup_agent(
    registry: &Registry,
    context: &FlockContext,
    name: &str,
) -> Result<Arc<FlockAgent>> {
    if let Some(agent) = registry.get_agent(name) {
        return Ok(agent);
    }
    match context.get_agent_definition(name) {
        Some(spec) => {
            tracing::debug!(agent = %name, "Rebuilding agent from its definition");
            Ok(Arc::new(FlockAgent::from_spec(spec, registry)?))
        }
        None => Err(FlockError::AgentNotFound(name.to_string())),
    }
}

/// Resolve inputs for `step`, run the agent and record its output.
pub async fn execute_agent(
    registry: &Registry,
    step: &NextStep,
    context: &mut FlockContext,
    timestamp: DateTime<Utc>,
) -> Result<Map<String, Value>> {
    let agent = lookup_agent(registry, context, &step.agent)?;
    let signature = step.effective_signature(&agent);

    context.set_variable(CURRENT_AGENT_KEY, Value::String(step.agent.clone()));
    let inputs = context.resolve_inputs(agent.name(), &signature, &step.input)?;

    tracing::info!(
        run_id = %context.run_id(),
        agent = %agent.name(),
        called_from = %step.called_from,
        "Agent started"
    );
    let result = agent.run(inputs, context).await?;

    context.record(agent.name(), &result, timestamp, None, &step.called_from);
    tracing::info!(
        run_id = %context.run_id(),
        agent = %agent.name(),
        outputs = result.len(),
        "Agent finished"
    );
    Ok(result)
}

/// Ask `agent_name`'s router for the next step.
///
/// Returns `None` when the agent has no router or the router chose no
/// agent. Context overrides in the decision are merged either way, and the
/// decision is attached to the latest run record by name.
pub async fn determine_next_agent(
    registry: &Registry,
    agent_name: &str,
    result: &Map<String, Value>,
    context: &mut FlockContext,
) -> Result<Option<NextStep>> {
    let agent = lookup_agent(registry, context, agent_name)?;
    let Some(router) = agent.router() else {
        tracing::debug!(agent = %agent_name, "No router, chain ends");
        return Ok(None);
    };

    let request = router
        .route(&agent, result, context, registry)
        .await
        .inspect_err(|err| {
            tracing::error!(
                run_id = %context.run_id(),
                agent = %agent_name,
                router = %router.type_name(),
                error = %err,
                "Routing failed"
            );
        })?
        .normalized();

    if let Some(overrides) = &request.context {
        context.merge(overrides);
    }
    context.patch_last_hand_off(request.clone());

    if request.is_terminal() {
        tracing::info!(run_id = %context.run_id(), agent = %agent_name, "Router ended the chain");
        return Ok(None);
    }

    let next_name = request.next_agent.clone();
    let next = match lookup_agent(registry, context, &next_name) {
        Ok(next) => next,
        Err(FlockError::AgentNotFound(_)) => {
            tracing::error!(
                run_id = %context.run_id(),
                agent = %agent_name,
                next_agent = %next_name,
                "Next agent not found"
            );
            return Err(FlockError::NextAgentNotFound(next_name));
        }
        Err(err) => return Err(err),
    };

    let extra_fields = match request.hand_off_mode {
        HandOffMode::Match => Vec::new(),
        HandOffMode::Add => {
            let declared = next.input_signature();
            let mut fields: Vec<String> = Vec::new();
            let outputs = agent.output_signature();
            let output_names: Vec<String> = if outputs.is_empty() {
                result.keys().cloned().collect()
            } else {
                outputs.names().into_iter().map(str::to_string).collect()
            };
            for name in output_names.into_iter().chain(request.input.keys().cloned()) {
                if !declared.contains(&name) && !fields.contains(&name) {
                    fields.push(name);
                }
            }
            fields
        }
    };

    tracing::info!(
        run_id = %context.run_id(),
        agent = %agent_name,
        next_agent = %next_name,
        mode = ?request.hand_off_mode,
        "Handing off"
    );

    Ok(Some(NextStep {
        agent: next_name,
        input: request.input,
        extra_fields,
        called_from: agent_name.to_string(),
    }))
}

/// Arguments of the [`EXECUTE_AGENT`] activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteAgentArgs {
    pub step: NextStep,
    pub context: FlockContext,
    pub timestamp: DateTime<Utc>,
}

/// Output of the [`EXECUTE_AGENT`] activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteAgentOutput {
    pub result: Map<String, Value>,
    pub context: FlockContext,
}

/// Arguments of the [`DETERMINE_NEXT_AGENT`] activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetermineNextArgs {
    pub agent: String,
    pub result: Map<String, Value>,
    pub context: FlockContext,
}

/// Output of the [`DETERMINE_NEXT_AGENT`] activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetermineNextOutput {
    pub next: Option<NextStep>,
    pub context: FlockContext,
}

/// [`execute_agent`] as a durable activity
#[derive(Debug, Clone)]
pub struct ExecuteAgentActivity {
    registry: Arc<Registry>,
}

impl ExecuteAgentActivity {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Activity for ExecuteAgentActivity {
    fn name(&self) -> &str {
        EXECUTE_AGENT
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let ExecuteAgentArgs {
            step,
            mut context,
            timestamp,
        } = serde_json::from_value(args)?;
        let result = execute_agent(&self.registry, &step, &mut context, timestamp).await?;
        Ok(serde_json::to_value(ExecuteAgentOutput { result, context })?)
    }
}

/// [`determine_next_agent`] as a durable activity
#[derive(Debug, Clone)]
pub struct DetermineNextAgentActivity {
    registry: Arc<Registry>,
}

impl DetermineNextAgentActivity {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Activity for DetermineNextAgentActivity {
    fn name(&self) -> &str {
        DETERMINE_NEXT_AGENT
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let DetermineNextArgs {
            agent,
            result,
            mut context,
        } = serde_json::from_value(args)?;
        let next = determine_next_agent(&self.registry, &agent, &result, &mut context).await?;
        Ok(serde_json::to_value(DetermineNextOutput { next, context })?)
    }
}
