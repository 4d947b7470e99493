//! Memory repository contract
//!
//! A CRUD boundary for long-lived memory entries, independent of the fusion
//! engine's in-process categories. `InMemoryRepository` is the reference
//! implementation; durable backends implement the same trait.

use crate::error::{Error, Result};
use crate::fusion::MemoryCategory;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stored memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub category: MemoryCategory,
    pub content: serde_json::Value,
    /// 0.0 to 1.0
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(category: MemoryCategory, content: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            category,
            content,
            importance: 0.5,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Search criteria; unset fields match everything
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub category: Option<MemoryCategory>,
    /// Case-insensitive substring of the serialized content or a tag
    pub text: Option<String>,
    pub min_importance: Option<f32>,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    fn matches(&self, entry: &MemoryEntry) -> bool {
        if self.category.is_some_and(|c| c != entry.category) {
            return false;
        }
        if self.min_importance.is_some_and(|min| entry.importance < min) {
            return false;
        }
        match &self.text {
            Some(text) => {
                let needle = text.to_lowercase();
                entry.content.to_string().to_lowercase().contains(&needle)
                    || entry.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

/// Storage contract for memory entries
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn get_memory(&self, id: &Uuid) -> Result<Option<MemoryEntry>>;

    /// Insert a new entry, returning its id
    async fn create_memory(&self, entry: MemoryEntry) -> Result<Uuid>;

    /// Replace an existing entry; fails with `Error::Memory` if absent
    async fn update_memory(&self, entry: MemoryEntry) -> Result<()>;

    /// Remove an entry, returning whether it existed
    async fn delete_memory(&self, id: &Uuid) -> Result<bool>;

    /// Entries matching `filter`, most important first
    async fn search_memory(&self, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>>;
}

/// In-process repository
pub struct InMemoryRepository {
    entries: Arc<RwLock<HashMap<Uuid, MemoryEntry>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryRepository {
    async fn get_memory(&self, id: &Uuid) -> Result<Option<MemoryEntry>> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn create_memory(&self, entry: MemoryEntry) -> Result<Uuid> {
        let id = entry.id;
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return Err(Error::Memory(format!("memory {} already exists", id)));
        }
        entries.insert(id, entry);
        Ok(id)
    }

    async fn update_memory(&self, mut entry: MemoryEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        let existing = entries
            .get_mut(&entry.id)
            .ok_or_else(|| Error::Memory(format!("memory {} not found", entry.id)))?;
        entry.created_at = existing.created_at;
        entry.updated_at = Utc::now();
        *existing = entry;
        Ok(())
    }

    async fn delete_memory(&self, id: &Uuid) -> Result<bool> {
        Ok(self.entries.write().await.remove(id).is_some())
    }

    async fn search_memory(&self, filter: &MemoryFilter) -> Result<Vec<MemoryEntry>> {
        let mut found: Vec<MemoryEntry> = self
            .entries
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}
