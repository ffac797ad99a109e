//! In-memory backend with simple keyword search

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::backend::{MemoryBackend, MemoryRecord, QueryOptions, StoreOptions};
use crate::error::Result;

/// In-memory backend for tests and single-process runs
pub struct InMemoryBackend {
    memories: RwLock<HashMap<String, MemoryRecord>>,
    next_id: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            memories: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Clear all memories
    pub fn clear(&self) {
        self.memories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.next_id.store(1, Ordering::SeqCst);
    }

    fn generate_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("mem_{}", id)
    }

    /// Fraction of query terms found in the content (or its tags)
    fn score_match(record: &MemoryRecord, query: &str) -> f64 {
        let haystack = format!("{} {}", record.content, record.tags.join(" ")).to_lowercase();
        let query_lower = query.to_lowercase();
        let query_terms: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        if query_terms.is_empty() {
            return 0.0;
        }

        let matches = query_terms.iter().filter(|t| haystack.contains(*t)).count();
        matches as f64 / query_terms.len() as f64
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    async fn store(
        &self,
        collection: &str,
        content: String,
        options: StoreOptions,
    ) -> Result<String> {
        let id = self.generate_id();
        let record = MemoryRecord {
            id: id.clone(),
            collection: collection.to_string(),
            content,
            created_at: Utc::now().to_rfc3339(),
            tags: options.tags,
            metadata: options.metadata,
            score: None,
        };

        self.memories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), record);
        Ok(id)
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        options: QueryOptions,
    ) -> Result<Vec<MemoryRecord>> {
        let memories = self.memories.read().unwrap_or_else(PoisonError::into_inner);

        let mut scored: Vec<MemoryRecord> = memories
            .values()
            .filter(|m| m.collection == collection)
            .filter_map(|m| {
                let score = Self::score_match(m, query);
                (score > 0.0 && score >= options.min_score).then(|| MemoryRecord {
                    score: Some(score),
                    ..m.clone()
                })
            })
            .collect();

        // Best score first, older memories first on ties
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)))
        });
        scored.truncate(options.limit);
        Ok(scored)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let memories = self.memories.read().unwrap_or_else(PoisonError::into_inner);
        Ok(memories.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut memories = self.memories.write().unwrap_or_else(PoisonError::into_inner);
        Ok(memories.remove(id).is_some())
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let memories = self.memories.read().unwrap_or_else(PoisonError::into_inner);
        Ok(memories.values().filter(|m| m.collection == collection).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_get() {
        let backend = InMemoryBackend::new();

        let id = backend
            .store("notes", "Hello world".to_string(), StoreOptions::default())
            .await
            .unwrap();
        assert!(id.starts_with("mem_"));

        let record = backend.get(&id).await.unwrap().unwrap();
        assert_eq!(record.content, "Hello world");
        assert_eq!(record.collection, "notes");
    }

    #[tokio::test]
    async fn test_search_scores_and_orders() {
        let backend = InMemoryBackend::new();
        for content in ["The sky is blue", "The grass is green", "A blue whale"] {
            backend
                .store("facts", content.to_string(), StoreOptions::default())
                .await
                .unwrap();
        }

        let results = backend
            .search("facts", "sky blue", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "The sky is blue");
        assert_eq!(results[0].score, Some(1.0));

        let none = backend
            .search("facts", "purple", QueryOptions::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let backend = InMemoryBackend::new();
        backend
            .store("a", "shared words".to_string(), StoreOptions::default())
            .await
            .unwrap();

        assert_eq!(backend.count("a").await.unwrap(), 1);
        assert_eq!(backend.count("b").await.unwrap(), 0);
        assert!(backend
            .search("b", "shared", QueryOptions::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_min_score_and_tags() {
        let backend = InMemoryBackend::new();
        backend
            .store(
                "a",
                "quarterly report".to_string(),
                StoreOptions::default().with_tag("finance"),
            )
            .await
            .unwrap();

        let tagged = backend
            .search("a", "finance", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let strict = backend
            .search(
                "a",
                "quarterly budget",
                QueryOptions {
                    min_score: 0.75,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let backend = InMemoryBackend::new();
        let id = backend
            .store("a", "x".to_string(), StoreOptions::default())
            .await
            .unwrap();

        assert!(backend.delete(&id).await.unwrap());
        assert!(!backend.delete(&id).await.unwrap());

        backend
            .store("a", "y".to_string(), StoreOptions::default())
            .await
            .unwrap();
        backend.clear();
        assert_eq!(backend.count("a").await.unwrap(), 0);
    }
}
