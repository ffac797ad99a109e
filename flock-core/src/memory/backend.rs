//! Memory backend trait for pluggable storage implementations
//!
//! Memories are grouped into named collections. The memory evaluator and
//! the memory module address a collection per agent or per flock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Core memory record returned by backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,

    pub collection: String,

    pub content: String,

    /// ISO 8601 timestamp when created
    pub created_at: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Relevance score, set on search results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Options for storing memories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl StoreOptions {
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Options for searching memories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub limit: usize,

    /// Results scoring below this are dropped
    pub min_score: f64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_score: 0.0,
        }
    }
}

/// The core memory backend trait
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Store a memory and return its ID
    async fn store(
        &self,
        collection: &str,
        content: String,
        options: StoreOptions,
    ) -> Result<String>;

    /// Search a collection, best matches first
    async fn search(
        &self,
        collection: &str,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<MemoryRecord>>;

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>>;

    /// Delete a memory by ID, returns true if it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    async fn count(&self, collection: &str) -> Result<u64>;
}
