//! Evaluator backed by the shared memory store

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{Evaluator, config_map};
use crate::agent::FlockAgent;
use crate::error::Result;
use crate::memory::{MemoryBackend, QueryOptions, StoreOptions};
use crate::tools::AgentTool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryMode {
    /// Search the collection with the inputs as query
    #[default]
    Read,
    /// Store the inputs as a new memory
    Write,
}

/// Configuration for [`MemoryEvaluator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEvaluatorConfig {
    pub mode: MemoryMode,

    /// Collection to use; defaults to the agent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Input used as the query (read) or content (write); all inputs when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_field: Option<String>,

    pub limit: usize,

    pub min_score: f64,
}

impl Default for MemoryEvaluatorConfig {
    fn default() -> Self {
        Self {
            mode: MemoryMode::Read,
            collection: None,
            input_field: None,
            limit: 5,
            min_score: 0.0,
        }
    }
}

/// Reads from or writes to a [`MemoryBackend`] without calling a model.
///
/// In read mode every declared output field receives the recalled
/// contents: joined by newlines for `str` fields, as a list otherwise. In
/// write mode output fields echo same-named inputs, and any other field
/// receives the id of the stored memory.
pub struct MemoryEvaluator {
    store: Arc<dyn MemoryBackend>,
    config: MemoryEvaluatorConfig,
}

impl MemoryEvaluator {
    pub fn new(store: Arc<dyn MemoryBackend>, config: MemoryEvaluatorConfig) -> Self {
        Self { store, config }
    }

    fn collection<'a>(&'a self, agent: &'a FlockAgent) -> &'a str {
        self.config.collection.as_deref().unwrap_or(agent.name())
    }

    fn text_of(&self, inputs: &Map<String, Value>) -> String {
        let selected: Vec<&Value> = match &self.config.input_field {
            Some(field) => inputs.get(field).into_iter().collect(),
            None => inputs.values().collect(),
        };
        selected
            .into_iter()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for MemoryEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEvaluator")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Evaluator for MemoryEvaluator {
    fn type_name(&self) -> &str {
        "memory"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    async fn evaluate(
        &self,
        agent: &FlockAgent,
        inputs: &Map<String, Value>,
        _tools: &[AgentTool],
    ) -> Result<Map<String, Value>> {
        let collection = self.collection(agent);
        let text = self.text_of(inputs);
        let signature = agent.output_signature();

        match self.config.mode {
            MemoryMode::Read => {
                let options = QueryOptions {
                    limit: self.config.limit,
                    min_score: self.config.min_score,
                };
                let records = self.store.search(collection, &text, options).await?;
                tracing::debug!(
                    agent = %agent.name(),
                    collection = %collection,
                    hits = records.len(),
                    "Memory recall"
                );

                let contents: Vec<String> = records.into_iter().map(|r| r.content).collect();
                Ok(signature
                    .fields()
                    .iter()
                    .map(|field| {
                        let value = match field.base_type().as_deref() {
                            Some("str" | "string") => Value::String(contents.join("\n")),
                            _ => Value::from(contents.clone()),
                        };
                        (field.name.clone(), value)
                    })
                    .collect())
            }
            MemoryMode::Write => {
                let options = StoreOptions::default().with_metadata("agent", Value::from(agent.name()));
                let id = self.store.store(collection, text, options).await?;
                tracing::debug!(agent = %agent.name(), collection = %collection, id = %id, "Memory stored");

                Ok(signature
                    .fields()
                    .iter()
                    .map(|field| {
                        let value = inputs
                            .get(&field.name)
                            .cloned()
                            .unwrap_or_else(|| Value::String(id.clone()));
                        (field.name.clone(), value)
                    })
                    .collect())
            }
        }
    }
}
