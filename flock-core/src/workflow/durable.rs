//! Durable execution
//!
//! A durable run splits the chain into activities that an external
//! workflow engine executes with a timeout and a retry policy. Everything
//! crossing the engine boundary is JSON: the workflow input, every
//! activity's arguments and every activity's output. The workflow body
//! itself only sequences activities and reads time from the engine's
//! deterministic clock, so an engine can replay it.
//!
//! [`LocalWorkflowEngine`] implements the engine contract in-process.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = LocalWorkflowEngine::new(&config.durable);
//! let handle = engine
//!     .start_workflow(FlockWorkflow::new(registry), input)
//!     .await?;
//! let run = handle.result().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::activities::{
    DetermineNextAgentActivity, DetermineNextArgs, DetermineNextOutput, ExecuteAgentActivity,
    ExecuteAgentArgs, ExecuteAgentOutput, NextStep,
};
use super::execution::{ChainState, RunResult};
use super::retry::RetryPolicy;
use crate::config::DurableConfig;
use crate::context::FlockContext;
use crate::error::{FlockError, Result};
use crate::registry::Registry;

/// A retryable unit of work with JSON arguments and output
#[async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, args: Value) -> Result<Value>;
}

/// How the engine runs one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    pub task_queue: String,

    #[serde(with = "humantime_serde")]
    pub start_to_close_timeout: Duration,

    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    /// Options for an activity of `agent`, using its own timeout and retry
    /// policy when configured
    pub fn for_agent(config: &DurableConfig, agent: &str) -> Self {
        Self {
            task_queue: config.task_queue.clone(),
            start_to_close_timeout: config.timeout_for(agent),
            retry_policy: config.retry_policy_for(agent).clone(),
        }
    }
}

/// Workflow engine contract used by durable runs
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Run `activity` with `args`, applying the timeout and retry policy
    async fn execute_activity(
        &self,
        activity: &dyn Activity,
        args: Value,
        options: &ActivityOptions,
    ) -> Result<Value>;

    /// Deterministic workflow time
    fn now(&self) -> DateTime<Utc>;

    /// Start `workflow` and return a handle to its eventual result
    async fn start_workflow(
        &self,
        workflow: FlockWorkflow,
        input: WorkflowInput,
    ) -> Result<WorkflowHandle>;
}

/// Input of a durable chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInput {
    pub start_agent: String,

    /// Initial context, carrying the agent definitions and initial input
    pub context: FlockContext,

    #[serde(default)]
    pub durable: DurableConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

/// Handle to a started workflow
#[derive(Debug)]
pub struct WorkflowHandle {
    workflow_id: String,
    task: JoinHandle<Result<RunResult>>,
}

impl WorkflowHandle {
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Wait for the workflow to finish
    pub async fn result(self) -> Result<RunResult> {
        self.task
            .await
            .map_err(|e| FlockError::Workflow(format!("workflow {} aborted: {}", self.workflow_id, e)))?
    }
}

/// The agent chain as a workflow: execute, route, repeat
#[derive(Debug, Clone)]
pub struct FlockWorkflow {
    execute: ExecuteAgentActivity,
    determine_next: DetermineNextAgentActivity,
}

impl FlockWorkflow {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            execute: ExecuteAgentActivity::new(registry.clone()),
            determine_next: DetermineNextAgentActivity::new(registry),
        }
    }

    pub async fn run(&self, engine: &dyn WorkflowEngine, input: WorkflowInput) -> Result<RunResult> {
        let WorkflowInput {
            start_agent,
            mut context,
            durable,
            max_steps,
        } = input;

        let run_id = context.run_id().to_string();
        let mut state = ChainState::Running;
        let mut step = NextStep::start(start_agent);
        let mut steps = 0;

        tracing::info!(
            run_id = %run_id,
            workflow_id = %context.workflow_id(),
            start_agent = %step.agent,
            "Durable run started"
        );

        loop {
            let options = ActivityOptions::for_agent(&durable, &step.agent);
            let args = serde_json::to_value(ExecuteAgentArgs {
                step: step.clone(),
                context,
                timestamp: engine.now(),
            })?;
            let output = match engine.execute_activity(&self.execute, args, &options).await {
                Ok(output) => output,
                Err(err) => {
                    state.advance(ChainState::Error, &run_id, &step.agent);
                    return Err(err);
                }
            };
            let ExecuteAgentOutput { result, context: after } = serde_json::from_value(output)?;
            context = after;
            steps += 1;

            state.advance(ChainState::Routing, &run_id, &step.agent);
            let args = serde_json::to_value(DetermineNextArgs {
                agent: step.agent.clone(),
                result,
                context,
            })?;
            let output = match engine
                .execute_activity(&self.determine_next, args, &options)
                .await
            {
                Ok(output) => output,
                Err(err) => {
                    state.advance(ChainState::Error, &run_id, &step.agent);
                    return Err(err);
                }
            };
            let DetermineNextOutput { next, context: after } = serde_json::from_value(output)?;
            context = after;

            let Some(next) = next else {
                state.advance(ChainState::Terminated, &run_id, &step.agent);
                break;
            };
            state.advance(ChainState::Running, &run_id, &next.agent);

            if max_steps.is_some_and(|max| steps >= max) {
                tracing::warn!(run_id = %run_id, steps, next_agent = %next.agent, "Step limit reached");
                break;
            }
            step = next;
        }

        tracing::info!(run_id = %run_id, steps, state = %state, "Durable run finished");
        Ok(RunResult {
            result: context
                .history()
                .last()
                .map(|record| record.data.clone())
                .unwrap_or_default(),
            last_agent: step.agent,
            context,
            state,
            steps,
        })
    }
}

/// In-process workflow engine.
///
/// Activities run on the current runtime under a `tokio` timeout and are
/// retried with exponential backoff. Every attempt starts from the same
/// JSON arguments, so a failed attempt leaves nothing behind. The clock is
/// fixed at the workflow timestamp of the run being executed.
#[derive(Debug, Clone)]
pub struct LocalWorkflowEngine {
    task_queue: String,
    clock: Option<DateTime<Utc>>,
}

impl LocalWorkflowEngine {
    pub fn new(config: &DurableConfig) -> Self {
        Self {
            task_queue: config.task_queue.clone(),
            clock: None,
        }
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    fn with_clock(&self, clock: DateTime<Utc>) -> Self {
        Self {
            task_queue: self.task_queue.clone(),
            clock: Some(clock),
        }
    }
}

#[async_trait]
impl WorkflowEngine for LocalWorkflowEngine {
    async fn execute_activity(
        &self,
        activity: &dyn Activity,
        args: Value,
        options: &ActivityOptions,
    ) -> Result<Value> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome =
                match tokio::time::timeout(options.start_to_close_timeout, activity.run(args.clone()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(FlockError::Timeout {
                        activity: activity.name().to_string(),
                        timeout: options.start_to_close_timeout,
                    }),
                };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !options.retry_policy.should_retry(&err, attempts) {
                tracing::error!(
                    activity = %activity.name(),
                    task_queue = %options.task_queue,
                    attempts,
                    error = %err,
                    "Activity failed"
                );
                return Err(err);
            }

            let delay = options.retry_policy.delay_for_attempt(attempts - 1);
            tracing::warn!(
                activity = %activity.name(),
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Activity failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    async fn start_workflow(
        &self,
        workflow: FlockWorkflow,
        input: WorkflowInput,
    ) -> Result<WorkflowHandle> {
        let workflow_id = if input.context.workflow_id().is_empty() {
            format!("flock-{}", input.context.run_id())
        } else {
            input.context.workflow_id().to_string()
        };
        let engine = self.with_clock(input.context.workflow_timestamp());

        tracing::info!(
            workflow_id = %workflow_id,
            task_queue = %self.task_queue,
            start_agent = %input.start_agent,
            "Starting workflow"
        );
        let task = tokio::spawn(async move { workflow.run(&engine, input).await });

        Ok(WorkflowHandle { workflow_id, task })
    }
}
