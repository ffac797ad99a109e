//! Module that recalls memories before evaluation and stores results after

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::Module;
use crate::agent::FlockAgent;
use crate::context::FlockContext;
use crate::error::Result;
use crate::evaluators::config_map;
use crate::memory::{MemoryBackend, QueryOptions, StoreOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryModuleConfig {
    pub enabled: bool,

    /// Collection to use; defaults to the agent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Input key the recalled memories are injected under
    pub inject_as: String,

    pub limit: usize,

    pub min_score: f64,

    /// Store each result as a new memory
    pub store_outputs: bool,
}

impl Default for MemoryModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collection: None,
            inject_as: "memories".to_string(),
            limit: 3,
            min_score: 0.0,
            store_outputs: true,
        }
    }
}

/// Gives any agent recall over past results.
///
/// Before evaluation the inputs are used as a query and the matches are
/// added to the inputs under `inject_as`. After evaluation the result is
/// stored as JSON text tagged with the agent name.
pub struct MemoryModule {
    name: String,
    store: Arc<dyn MemoryBackend>,
    config: MemoryModuleConfig,
}

impl MemoryModule {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn MemoryBackend>,
        config: MemoryModuleConfig,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            config,
        }
    }

    fn collection<'a>(&'a self, agent: &'a FlockAgent) -> &'a str {
        self.config.collection.as_deref().unwrap_or(agent.name())
    }
}

impl std::fmt::Debug for MemoryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryModule")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Module for MemoryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        "memory"
    }

    fn config(&self) -> Map<String, Value> {
        config_map(&self.config)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn pre_evaluate(
        &self,
        agent: &FlockAgent,
        mut inputs: Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        let query = inputs
            .values()
            .map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");

        let options = QueryOptions {
            limit: self.config.limit,
            min_score: self.config.min_score,
        };
        let recalled: Vec<Value> = self
            .store
            .search(self.collection(agent), &query, options)
            .await?
            .into_iter()
            .map(|record| Value::String(record.content))
            .collect();

        tracing::debug!(agent = %agent.name(), recalled = recalled.len(), "Injecting memories");
        inputs.insert(self.config.inject_as.clone(), Value::Array(recalled));
        Ok(inputs)
    }

    async fn post_evaluate(
        &self,
        agent: &FlockAgent,
        _inputs: &Map<String, Value>,
        result: Map<String, Value>,
        _context: &mut FlockContext,
    ) -> Result<Map<String, Value>> {
        if self.config.store_outputs && !result.is_empty() {
            let content = serde_json::to_string(&result)?;
            self.store
                .store(
                    self.collection(agent),
                    content,
                    StoreOptions::default().with_tag(agent.name()),
                )
                .await?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_stores_results_and_injects_recall() {
        let store = Arc::new(InMemoryBackend::new());
        let module = MemoryModule::new("recall", store.clone(), MemoryModuleConfig::default());
        let agent = FlockAgent::builder("planner").input("goal").output("plan").build();
        let mut ctx = FlockContext::new();

        let result = json!({"plan": "learn rust lifetimes"}).as_object().cloned().unwrap();
        module
            .post_evaluate(&agent, &Map::new(), result, &mut ctx)
            .await
            .unwrap();
        assert_eq!(store.count("planner").await.unwrap(), 1);

        let mut inputs = Map::new();
        inputs.insert("goal".to_string(), json!("rust"));
        let inputs = module.pre_evaluate(&agent, inputs, &mut ctx).await.unwrap();
        assert_eq!(inputs["goal"], "rust");
        assert_eq!(inputs["memories"], json!([r#"{"plan":"learn rust lifetimes"}"#]));
    }

    #[tokio::test]
    async fn test_store_outputs_disabled() {
        let store = Arc::new(InMemoryBackend::new());
        let module = MemoryModule::new(
            "recall",
            store.clone(),
            MemoryModuleConfig {
                store_outputs: false,
                collection: Some("shared".to_string()),
                ..Default::default()
            },
        );
        let agent = FlockAgent::builder("planner").build();
        let result = json!({"plan": "x"}).as_object().cloned().unwrap();

        module
            .post_evaluate(&agent, &Map::new(), result, &mut FlockContext::new())
            .await
            .unwrap();
        assert_eq!(store.count("shared").await.unwrap(), 0);
    }
}
