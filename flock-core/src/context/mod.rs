//! Shared execution context
//!
//! `FlockContext` is the single source of truth for one run: a key-value
//! state that agents read inputs from and write outputs to, plus an
//! append-only history of [`RunRecord`]s.
//!
//! Agent outputs are written under namespaced keys (`"{agent}.{field}"`)
//! together with the [`LAST_RESULT_KEY`] and [`LAST_AGENT_KEY`] convenience
//! globals. The context round-trips losslessly through its JSON form, which
//! is what crosses durable-execution boundaries.
//!
//! # Example
//!
//! ```rust
//! use flock_core::context::FlockContext;
//! use serde_json::json;
//!
//! let mut ctx = FlockContext::new();
//! let data = json!({"foo": 1}).as_object().cloned().unwrap();
//! ctx.record("agentX", &data, chrono::Utc::now(), None, "");
//!
//! assert_eq!(ctx.get_variable("agentX.foo"), Some(&json!(1)));
//! assert_eq!(ctx.history().len(), 1);
//! ```

mod persist;
mod record;

pub use record::RunRecord;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::agent::FlockAgent;
use crate::error::{FlockError, Result};
use crate::routing::HandOffRequest;
use crate::serialization::AgentSpec;
use crate::signature::Signature;

/// Mapping passed to a run as its initial input
pub const INITIAL_INPUT_KEY: &str = "flock.initial_input";
/// Output of the most recently recorded agent
pub const LAST_RESULT_KEY: &str = "flock.last_result";
/// Name of the most recently recorded agent
pub const LAST_AGENT_KEY: &str = "flock.last_agent";
/// Name of the agent currently executing
pub const CURRENT_AGENT_KEY: &str = "flock.current_agent";
/// Run identifier mirrored into state
pub const RUN_ID_KEY: &str = "flock.run_id";
/// Validation feedback written by assertion modules
pub const FEEDBACK_KEY: &str = "flock.assertion_feedback";
/// Prefix of the per-agent retry counters kept by the feedback router
pub const RETRY_COUNT_PREFIX: &str = "flock.retry_count";

/// Mutable, versioned state and history for a single run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlockContext {
    state: Map<String, Value>,

    history: Vec<RunRecord>,

    #[serde(default)]
    agent_definitions: BTreeMap<String, AgentSpec>,

    run_id: String,

    #[serde(default)]
    workflow_id: String,

    workflow_timestamp: DateTime<Utc>,

    /// Bumped on every state write that changes a value
    #[serde(default)]
    version: u64,
}

impl Default for FlockContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FlockContext {
    /// Create a context for a new in-process run
    pub fn new() -> Self {
        Self::with_identity(
            format!("run_{}", uuid::Uuid::new_v4().simple()),
            String::new(),
            Utc::now(),
        )
    }

    /// Create a context with explicit identity (durable runs take these from the engine)
    pub fn with_identity(
        run_id: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_timestamp: DateTime<Utc>,
    ) -> Self {
        let run_id = run_id.into();
        let mut state = Map::new();
        state.insert(RUN_ID_KEY.to_string(), Value::String(run_id.clone()));

        Self {
            state,
            history: Vec::new(),
            agent_definitions: BTreeMap::new(),
            run_id,
            workflow_id: workflow_id.into(),
            workflow_timestamp,
            version: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn workflow_timestamp(&self) -> DateTime<Utc> {
        self.workflow_timestamp
    }

    /// Number of state writes that changed a value
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Direct access to the state map. Bypasses observability; prefer [`set_variable`](Self::set_variable).
    pub fn state_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.state
    }

    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Get a state value. A stored `Null` is returned as `Some(&Value::Null)`.
    pub fn get_variable(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn has_variable(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    /// Get a state value, falling back to `default`
    pub fn get_variable_or(&self, key: &str, default: Value) -> Value {
        self.get_variable(key).cloned().unwrap_or(default)
    }

    /// Canonical setter. Emits a trace event unless the value is unchanged.
    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if self.state.get(&key) == Some(&value) {
            self.state.insert(key, value);
            return;
        }

        self.version += 1;
        tracing::debug!(
            run_id = %self.run_id,
            key = %key,
            version = self.version,
            "Context variable set"
        );
        self.state.insert(key, value);
    }

    /// Remove a state value
    pub fn remove_variable(&mut self, key: &str) -> Option<Value> {
        let removed = self.state.remove(key);
        if removed.is_some() {
            self.version += 1;
            tracing::debug!(run_id = %self.run_id, key = %key, "Context variable removed");
        }
        removed
    }

    /// Merge a partial state into the context through the canonical setter
    pub fn merge(&mut self, values: &Map<String, Value>) {
        for (key, value) in values {
            self.set_variable(key.clone(), value.clone());
        }
    }

    /// Append a run record and publish its outputs into state.
    ///
    /// `data` is copied. Every field is written as `"{agent}.{field}"`, and
    /// the last-result/last-agent keys are updated. Returns the record id.
    pub fn record(
        &mut self,
        agent_name: &str,
        data: &Map<String, Value>,
        timestamp: DateTime<Utc>,
        hand_off: Option<HandOffRequest>,
        called_from: &str,
    ) -> String {
        let record = RunRecord::new(agent_name, data.clone(), timestamp, hand_off, called_from);
        let id = record.id.clone();

        tracing::info!(
            run_id = %self.run_id,
            agent = %agent_name,
            record_id = %id,
            called_from = %called_from,
            "Recorded agent run"
        );

        self.history.push(record);

        for (key, value) in data {
            self.set_variable(format!("{}.{}", agent_name, key), value.clone());
        }
        self.set_variable(LAST_RESULT_KEY, Value::Object(data.clone()));
        self.set_variable(LAST_AGENT_KEY, Value::String(agent_name.to_string()));

        id
    }

    /// Attach the router decision to the most recent record.
    ///
    /// Returns `false` if there is no record or it already carries a decision.
    pub fn patch_last_hand_off(&mut self, hand_off: HandOffRequest) -> bool {
        match self.history.last_mut() {
            Some(record) if record.hand_off.is_none() => {
                record.hand_off = Some(hand_off.normalized());
                true
            }
            _ => false,
        }
    }

    /// Ordered records for one agent
    pub fn get_agent_history(&self, agent_name: &str) -> Vec<&RunRecord> {
        self.history
            .iter()
            .filter(|record| record.agent == agent_name)
            .collect()
    }

    /// Newest value of `key` found in any record's output
    pub fn get_most_recent_value(&self, key: &str) -> Option<&Value> {
        self.history
            .iter()
            .rev()
            .find_map(|record| record.data.get(key))
    }

    /// The mapping passed as the run's initial input, if any
    pub fn initial_input(&self) -> Option<&Map<String, Value>> {
        self.get_variable(INITIAL_INPUT_KEY).and_then(Value::as_object)
    }

    /// Resolve every field of `signature` for `agent_name`.
    ///
    /// Lookup order for a bare field: explicit `overrides`, the raw state key,
    /// the newest history value, then the initial input. Dotted fields
    /// (`agent.field`) are exact state lookups. Unresolvable fields are fatal.
    /// Override keys the signature does not declare are passed through after
    /// the declared fields.
    pub fn resolve_inputs(
        &self,
        agent_name: &str,
        signature: &Signature,
        overrides: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let mut resolved = Map::new();

        for field in signature.fields() {
            let name = field.name.as_str();
            let value = overrides
                .get(name)
                .or_else(|| self.lookup(name))
                .cloned();

            match value {
                Some(value) => {
                    resolved.insert(name.to_string(), value);
                }
                None => {
                    let err = FlockError::Resolution {
                        agent: agent_name.to_string(),
                        field: name.to_string(),
                        message: "no value in overrides, state, history or initial input"
                            .to_string(),
                    };
                    tracing::error!(
                        run_id = %self.run_id,
                        agent = %agent_name,
                        field = %name,
                        signature = %signature,
                        error = %err,
                        "Input resolution failed"
                    );
                    return Err(err);
                }
            }
        }

        for (key, value) in overrides {
            if !resolved.contains_key(key) {
                resolved.insert(key.clone(), value.clone());
            }
        }

        Ok(resolved)
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        if name.contains('.') {
            return self.get_variable(name);
        }

        self.get_variable(name)
            .or_else(|| self.get_most_recent_value(name))
            .or_else(|| self.initial_input().and_then(|input| input.get(name)))
    }

    /// Next input for `agent`: a single value when one field is declared,
    /// a mapping otherwise, or the initial input when nothing is declared.
    pub fn next_input_for(&self, agent: &FlockAgent) -> Result<Value> {
        let signature = agent.input_signature();
        if signature.is_empty() {
            return Ok(self
                .get_variable(INITIAL_INPUT_KEY)
                .cloned()
                .unwrap_or(Value::Object(Map::new())));
        }

        let resolved = self.resolve_inputs(agent.name(), &signature, &Map::new())?;
        if resolved.len() == 1 {
            return Ok(resolved.into_iter().map(|(_, v)| v).next().unwrap_or(Value::Null));
        }
        Ok(Value::Object(resolved))
    }

    /// Store the serializable definition of an agent for durable reconstruction
    pub fn add_agent_definition(&mut self, spec: AgentSpec) {
        self.agent_definitions.insert(spec.name.clone(), spec);
    }

    pub fn get_agent_definition(&self, name: &str) -> Option<&AgentSpec> {
        self.agent_definitions.get(name)
    }

    pub fn agent_definitions(&self) -> &BTreeMap<String, AgentSpec> {
        &self.agent_definitions
    }

    /// Independent copy with no shared state
    pub fn deepcopy(&self) -> Self {
        self.clone()
    }

    /// Canonical JSON representation
    pub fn to_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuild a context from [`to_dict`](Self::to_dict) output
    pub fn from_dict(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}
