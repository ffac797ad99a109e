//! Run records: one entry per agent execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::routing::HandOffRequest;

/// A single agent execution in a run's history.
///
/// Created and appended once. Only `hand_off` changes afterwards, and only
/// once, when the router decision for this run becomes known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique id: agent name plus a random suffix
    pub id: String,

    /// Name of the agent that ran
    pub agent: String,

    /// Output produced by the agent (owned copy)
    pub data: Map<String, Value>,

    /// When the run was recorded
    pub timestamp: DateTime<Utc>,

    /// Router decision taken after this run, if any
    #[serde(default)]
    pub hand_off: Option<HandOffRequest>,

    /// Agent that triggered this run; empty for the start agent
    #[serde(default)]
    pub called_from: String,
}

impl RunRecord {
    pub(crate) fn new(
        agent: impl Into<String>,
        data: Map<String, Value>,
        timestamp: DateTime<Utc>,
        hand_off: Option<HandOffRequest>,
        called_from: impl Into<String>,
    ) -> Self {
        let agent = agent.into();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("{}_{}", agent, &suffix[..12]),
            agent,
            data,
            timestamp,
            hand_off,
            called_from: called_from.into(),
        }
    }

    /// Whether this run was the first in its chain
    pub fn is_start(&self) -> bool {
        self.called_from.is_empty()
    }
}
