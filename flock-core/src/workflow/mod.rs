//! Chain execution
//!
//! A chain runs one agent, asks its router for the next one and repeats
//! until no next agent is chosen. Two execution modes share the same steps
//! and produce the same history:
//!
//! - **In-process** ([`run_local`]): a single async loop.
//! - **Durable** ([`FlockWorkflow`]): each step is an [`Activity`] executed
//!   by a [`WorkflowEngine`] with its own timeout and [`RetryPolicy`].
//!
//! Chain states move `Running -> Routing -> Running | Terminated`, with any
//! failure moving to `Error`.

mod activities;
mod durable;
mod execution;
mod local;
pub mod retry;

pub use activities::{
    DETERMINE_NEXT_AGENT, DetermineNextAgentActivity, DetermineNextArgs, DetermineNextOutput,
    EXECUTE_AGENT, ExecuteAgentActivity, ExecuteAgentArgs, ExecuteAgentOutput, NextStep,
    determine_next_agent, execute_agent, lookup_agent,
};
pub use durable::{
    Activity, ActivityOptions, FlockWorkflow, LocalWorkflowEngine, WorkflowEngine, WorkflowHandle,
    WorkflowInput,
};
pub use execution::{ChainState, RunResult};
pub use local::run_local;
pub use retry::RetryPolicy;
