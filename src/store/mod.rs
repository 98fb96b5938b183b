//! Cache storage abstraction.
//!
//! A store holds named cache generations, each mapping a [`CacheKey`] to a
//! captured [`Response`]. Writes to an existing key replace the entry.

mod disk;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::http::{CacheKey, Response};

pub use disk::DiskCacheStore;

/// Name-versioned key/value storage for responses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Lists the names of all cache generations, sorted.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Creates the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    /// Deletes the named cache. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Looks up an entry in the named cache.
    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<Response>, CacheError>;

    /// Stores an entry in the named cache, creating the cache if needed.
    async fn put(&self, name: &str, key: CacheKey, response: Response) -> Result<(), CacheError>;

    /// Lists the keys stored in the named cache.
    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>, CacheError>;

    /// Returns true if the named cache exists.
    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.keys().await?.iter().any(|k| k == name))
    }
}

type Generation = BTreeMap<CacheKey, Response>;

/// In-process cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    caches: RwLock<BTreeMap<String, Generation>>,
    quota: Option<usize>,
}

impl MemoryCacheStore {
    /// Creates an empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits the total body bytes held across all generations.
    #[must_use]
    pub const fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Returns the total body bytes currently stored.
    pub async fn usage(&self) -> usize {
        let caches = self.caches.read().await;
        caches
            .values()
            .flat_map(BTreeMap::values)
            .map(|r| r.body.len())
            .sum()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.caches.read().await.keys().cloned().collect())
    }

    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn get(&self, name: &str, key: &CacheKey) -> Result<Option<Response>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.get(key))
            .cloned())
    }

    async fn put(&self, name: &str, key: CacheKey, response: Response) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        if let Some(quota) = self.quota {
            let replaced = caches
                .get(name)
                .and_then(|cache| cache.get(&key))
                .map_or(0, |r| r.body.len());
            let used: usize = caches
                .values()
                .flat_map(BTreeMap::values)
                .map(|r| r.body.len())
                .sum();
            if used - replaced + response.body.len() > quota {
                return Err(CacheError::QuotaExceeded);
            }
        }
        caches
            .entry(name.to_string())
            .or_default()
            .insert(key, response);
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CacheKey>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .get(name)
            .map(|cache| cache.keys().cloned().collect())
            .unwrap_or_default())
    }
}
