//! Chain state and run results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::context::FlockContext;

/// State of an agent chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainState {
    /// An agent is executing or about to
    Running,
    /// The evaluator finished and the router is deciding
    Routing,
    /// No router, or the router returned no next agent
    Terminated,
    /// A step failed and was not recovered
    Error,
}

impl ChainState {
    pub fn is_final(&self) -> bool {
        matches!(self, ChainState::Terminated | ChainState::Error)
    }

    /// Move to `next`, tracing the transition
    pub(crate) fn advance(&mut self, next: ChainState, run_id: &str, agent: &str) {
        tracing::debug!(
            run_id = %run_id,
            agent = %agent,
            from = %self,
            to = %next,
            "Chain state changed"
        );
        *self = next;
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainState::Running => "running",
            ChainState::Routing => "routing",
            ChainState::Terminated => "terminated",
            ChainState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed chain.
///
/// `state` is [`ChainState::Terminated`] for a chain that ended on its own,
/// or [`ChainState::Running`] when the step bound stopped a chain that still
/// had a next agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Output of the last agent that ran
    pub result: Map<String, Value>,

    /// Final context, including the full history
    pub context: FlockContext,

    pub last_agent: String,

    pub state: ChainState,

    /// Number of agent runs
    pub steps: usize,
}

impl RunResult {
    /// Whether the chain ended because no next agent was chosen
    pub fn is_terminated(&self) -> bool {
        self.state == ChainState::Terminated
    }

    /// Agents in execution order
    pub fn agents(&self) -> Vec<&str> {
        self.context
            .history()
            .iter()
            .map(|record| record.agent.as_str())
            .collect()
    }
}
