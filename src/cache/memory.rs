//! In-memory generation storage.
//!
//! Each generation is a moka cache built without capacity or TTL: entries
//! live until their generation is deleted. Eviction would break the
//! offline guarantee for precached assets.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use moka::future::Cache;

use super::{CacheGeneration, CacheStorage};
use crate::types::{CachedResponse, RequestKey};
use crate::{MuninnError, Result};

/// Process-lifetime storage of generations.
#[derive(Default)]
pub struct MemoryCacheStorage {
    generations: RwLock<BTreeMap<String, Arc<MemoryGeneration>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn open(&self, name: &str) -> Result<Arc<dyn CacheGeneration>> {
        // Fast path: already open
        {
            let generations = self.generations.read().map_err(|e| {
                MuninnError::Storage(format!("failed to acquire read lock: {e}"))
            })?;
            if let Some(generation) = generations.get(name) {
                return Ok(generation.clone());
            }
        }

        let mut generations = self.generations.write().map_err(|e| {
            MuninnError::Storage(format!("failed to acquire write lock: {e}"))
        })?;
        let generation = generations
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryGeneration::new(name)))
            .clone();
        Ok(generation)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut generations = self.generations.write().map_err(|e| {
            MuninnError::Storage(format!("failed to acquire write lock: {e}"))
        })?;
        Ok(generations.remove(name).is_some())
    }

    async fn names(&self) -> Result<Vec<String>> {
        let generations = self.generations.read().map_err(|e| {
            MuninnError::Storage(format!("failed to acquire read lock: {e}"))
        })?;
        Ok(generations.keys().cloned().collect())
    }
}

/// One in-memory generation.
pub struct MemoryGeneration {
    name: String,
    entries: Cache<RequestKey, CachedResponse>,
    committed: AtomicBool,
}

impl MemoryGeneration {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Cache::builder().build(),
            committed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CacheGeneration for MemoryGeneration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<()> {
        self.entries.insert(key, response).await;
        Ok(())
    }

    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
        Ok(self.entries.get(key).await)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        Ok(self
            .entries
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn commit(&self) -> Result<()> {
        self.committed.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_committed(&self) -> Result<bool> {
        Ok(self.committed.load(Ordering::Acquire))
    }
}
