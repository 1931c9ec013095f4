//! Generation-tagged cache storage.
//!
//! A *generation* is one named snapshot store of responses, created per
//! deployment and superseded wholesale by the next one. Storage backends
//! implement two traits:
//!
//! - [`CacheStorage`]: the set of generations: open (create or reuse),
//!   delete, enumerate.
//! - [`CacheGeneration`]: one generation's entries: put (overwrite),
//!   exact-key lookup, enumeration, and a commit mark set once an install
//!   has written everything.
//!
//! Two backends ship with the crate:
//!
//! - [`MemoryCacheStorage`]: moka-backed, unbounded, lives as long as the
//!   process.
//! - [`DiskCacheStorage`]: one directory per generation, survives
//!   restarts so a host can keep serving offline after a reboot.
//!
//! Which generation answers lookups is not a property of the storage: it is
//! held by a [`CurrentGeneration`] handle that the lifecycle controller
//! switches and the router reads.

pub mod disk;
pub mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::Result;
use crate::types::{CachedResponse, RequestKey};

/// The set of named generations.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &str;

    /// Open the generation called `name`, creating it if needed.
    ///
    /// Idempotent: opening an existing generation returns a handle to the
    /// same entries.
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheGeneration>>;

    /// Irreversibly remove a whole generation.
    ///
    /// Returns `false` if no such generation existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all existing generations.
    async fn names(&self) -> Result<Vec<String>>;

    /// Whether a generation called `name` exists.
    async fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.names().await?.iter().any(|n| n == name))
    }
}

/// One generation's entries.
#[async_trait]
pub trait CacheGeneration: Send + Sync {
    /// Generation tag.
    fn name(&self) -> &str;

    /// Store `response` under `key`, replacing any previous entry.
    async fn put(&self, key: RequestKey, response: CachedResponse) -> Result<()>;

    /// Exact-key lookup. No prefix or partial matching.
    async fn lookup(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

    /// All keys currently stored.
    async fn keys(&self) -> Result<Vec<RequestKey>>;

    /// Mark the generation as fully populated.
    ///
    /// Called once after the last precache write. The mark persists as long
    /// as the generation does.
    async fn commit(&self) -> Result<()>;

    /// Whether [`commit`](Self::commit) has run for this generation.
    async fn is_committed(&self) -> Result<bool>;

    /// Number of entries.
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Handle to the generation currently answering lookups.
///
/// Cloning shares the same pointer. At most one generation is current at a
/// time; `None` means nothing has been activated yet and the gateway does
/// not intercept.
#[derive(Clone, Default)]
pub struct CurrentGeneration {
    inner: Arc<RwLock<Option<Arc<dyn CacheGeneration>>>>,
}

impl CurrentGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation, if any.
    pub fn get(&self) -> Option<Arc<dyn CacheGeneration>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tag of the current generation, if any.
    pub fn name(&self) -> Option<String> {
        self.get().map(|g| g.name().to_string())
    }

    /// Make `generation` current, returning the one it replaced.
    pub fn set(&self, generation: Arc<dyn CacheGeneration>) -> Option<Arc<dyn CacheGeneration>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(generation)
    }

    /// Whether `name` is the current generation's tag.
    pub fn is(&self, name: &str) -> bool {
        self.get().is_some_and(|g| g.name() == name)
    }
}

impl fmt::Debug for CurrentGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentGeneration")
            .field("name", &self.name())
            .finish()
    }
}
