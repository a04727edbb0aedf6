//! In-process [`RemoteCacheManager`] for tests and single-node development.
//!
//! Caches must be created before use, exactly like on a real cluster, and
//! queries are parsed and evaluated on this "server" side with
//! [`ParsedQuery`], independently of how the embedded backend filters.
//! Individual caches can be made to fail, entirely or for writes only, to
//! exercise partial-failure paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::cache::remote::{RemoteCacheManager, RemoteKey, TYPE_FIELD};
use crate::error::{StateError, StateResult};
use crate::query::{ParsedQuery, field_equals};

#[derive(Default)]
struct LoopbackCache {
    definition: String,
    entries: HashMap<String, Value>,
}

pub struct LoopbackCacheManager {
    caches: RwLock<HashMap<String, LoopbackCache>>,
    failing: RwLock<HashSet<String>>,
    read_only: RwLock<HashSet<String>>,
    started: AtomicBool,
}

impl Default for LoopbackCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackCacheManager {
    pub fn new() -> Self {
        Self {
            caches: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
            read_only: RwLock::new(HashSet::new()),
            started: AtomicBool::new(true),
        }
    }

    /// Simulate the cluster going down (or coming back).
    pub fn set_started(&self, started: bool) {
        self.started.store(started, Ordering::SeqCst);
    }

    /// Make every operation on `cache`, including creation, fail.
    pub async fn fail_cache(&self, cache: &str) {
        self.failing.write().await.insert(cache.to_string());
    }

    pub async fn heal_cache(&self, cache: &str) {
        self.failing.write().await.remove(cache);
    }

    /// Make writes to `cache` fail while reads keep working.
    pub async fn fail_writes(&self, cache: &str) {
        self.read_only.write().await.insert(cache.to_string());
    }

    pub async fn heal_writes(&self, cache: &str) {
        self.read_only.write().await.remove(cache);
    }

    /// Names of all created caches, sorted.
    pub async fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// The definition a cache was created with.
    pub async fn definition(&self, cache: &str) -> Option<String> {
        self.caches
            .read()
            .await
            .get(cache)
            .map(|c| c.definition.clone())
    }

    pub async fn len(&self, cache: &str) -> usize {
        self.caches
            .read()
            .await
            .get(cache)
            .map_or(0, |c| c.entries.len())
    }

    async fn check(&self, cache: &str) -> StateResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(StateError::Transport("cluster is not started".to_string()));
        }
        if self.failing.read().await.contains(cache) {
            return Err(StateError::Transport(format!("cache '{cache}' is unavailable")));
        }
        Ok(())
    }

    async fn check_write(&self, cache: &str) -> StateResult<()> {
        self.check(cache).await?;
        if self.read_only.read().await.contains(cache) {
            return Err(StateError::Transport(format!("cache '{cache}' rejected the write")));
        }
        Ok(())
    }
}

fn missing(cache: &str) -> StateError {
    StateError::Transport(format!("cache '{cache}' does not exist"))
}

#[async_trait]
impl RemoteCacheManager for LoopbackCacheManager {
    async fn get_or_create_cache(&self, cache: &str, definition: &str) -> StateResult<()> {
        self.check(cache).await?;
        self.caches
            .write()
            .await
            .entry(cache.to_string())
            .or_insert_with(|| LoopbackCache {
                definition: definition.to_string(),
                entries: HashMap::new(),
            });
        Ok(())
    }

    async fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn get(&self, cache: &str, key: &RemoteKey) -> StateResult<Option<Value>> {
        self.check(cache).await?;
        let caches = self.caches.read().await;
        let c = caches.get(cache).ok_or_else(|| missing(cache))?;
        Ok(c.entries.get(&key.encoded).cloned())
    }

    async fn put(&self, cache: &str, key: &RemoteKey, value: &Value) -> StateResult<()> {
        self.check_write(cache).await?;
        let mut caches = self.caches.write().await;
        let c = caches.get_mut(cache).ok_or_else(|| missing(cache))?;
        c.entries.insert(key.encoded.clone(), value.clone());
        Ok(())
    }

    async fn put_if_absent(
        &self,
        cache: &str,
        key: &RemoteKey,
        value: &Value,
    ) -> StateResult<bool> {
        self.check_write(cache).await?;
        let mut caches = self.caches.write().await;
        let c = caches.get_mut(cache).ok_or_else(|| missing(cache))?;
        if c.entries.contains_key(&key.encoded) {
            return Ok(false);
        }
        c.entries.insert(key.encoded.clone(), value.clone());
        Ok(true)
    }

    async fn remove(&self, cache: &str, key: &RemoteKey) -> StateResult<()> {
        self.check_write(cache).await?;
        let mut caches = self.caches.write().await;
        let c = caches.get_mut(cache).ok_or_else(|| missing(cache))?;
        c.entries.remove(&key.encoded);
        Ok(())
    }

    async fn clear(&self, cache: &str) -> StateResult<()> {
        self.check_write(cache).await?;
        let mut caches = self.caches.write().await;
        let c = caches.get_mut(cache).ok_or_else(|| missing(cache))?;
        c.entries.clear();
        Ok(())
    }

    async fn values(&self, cache: &str) -> StateResult<Vec<Value>> {
        self.check(cache).await?;
        let caches = self.caches.read().await;
        let c = caches.get(cache).ok_or_else(|| missing(cache))?;
        Ok(c.entries.values().cloned().collect())
    }

    async fn query(
        &self,
        cache: &str,
        query: &str,
        params: &BTreeMap<String, String>,
    ) -> StateResult<Vec<Value>> {
        self.check(cache).await?;
        let parsed = ParsedQuery::parse(query)?;
        let predicates = parsed.bind(params)?;
        let caches = self.caches.read().await;
        let c = caches.get(cache).ok_or_else(|| missing(cache))?;
        Ok(c.entries
            .values()
            .filter(|doc| field_equals(doc, TYPE_FIELD, &parsed.entity))
            .filter(|doc| predicates.iter().all(|(f, v)| field_equals(doc, f, v)))
            .cloned()
            .collect())
    }
}
