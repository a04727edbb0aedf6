//! Remote cache handles over a clustered, queryable cache server.
//!
//! The server itself is reached through a [`RemoteCacheManager`]. Handles
//! encode keys with [`CacheKey::encode`], send values as JSON documents
//! tagged with their indexed `_type`, and run filtered listings server-side.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cache::CacheHandle;
use crate::catalog::CacheSpec;
use crate::error::{StateError, StateResult};
use crate::key::CacheKey;
use crate::query::FieldQuery;
use crate::types::CacheValue;

/// Field carrying the indexed message type of a remote document.
pub const TYPE_FIELD: &str = "_type";

/// Connection to the clustered cache server.
///
/// Values are exchanged as JSON: objects for entity caches, bare strings
/// for caches of plain text. Every method addresses a cache by name.
#[async_trait]
pub trait RemoteCacheManager: Send + Sync {
    /// Idempotently create `cache` from its declarative definition.
    async fn get_or_create_cache(&self, cache: &str, definition: &str) -> StateResult<()>;

    /// Whether the cluster reports itself started and able to serve requests.
    async fn is_started(&self) -> bool;

    async fn get(&self, cache: &str, key: &RemoteKey) -> StateResult<Option<Value>>;

    async fn put(&self, cache: &str, key: &RemoteKey, value: &Value) -> StateResult<()>;

    /// Store only if the key is absent; returns whether the value was stored.
    async fn put_if_absent(&self, cache: &str, key: &RemoteKey, value: &Value)
    -> StateResult<bool>;

    async fn remove(&self, cache: &str, key: &RemoteKey) -> StateResult<()>;

    async fn clear(&self, cache: &str) -> StateResult<()>;

    async fn values(&self, cache: &str) -> StateResult<Vec<Value>>;

    /// Run an indexed query with named parameters on the server.
    async fn query(
        &self,
        cache: &str,
        query: &str,
        params: &BTreeMap<String, String>,
    ) -> StateResult<Vec<Value>>;
}

/// An encoded key plus how the server should interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey {
    pub encoded: String,
    /// Message type of a JSON key; `None` for plain text keys.
    pub type_name: Option<&'static str>,
}

impl RemoteKey {
    pub fn of<K: CacheKey>(key: &K) -> Self {
        Self {
            encoded: key.encode(),
            type_name: K::TYPE_NAME,
        }
    }

    pub fn is_json(&self) -> bool {
        self.type_name.is_some()
    }
}

/// Remote backend: provisions caches on the cluster and hands out handles.
#[derive(Clone)]
pub struct RemoteBackend {
    manager: Arc<dyn RemoteCacheManager>,
}

impl RemoteBackend {
    pub fn new(manager: Arc<dyn RemoteCacheManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<dyn RemoteCacheManager> {
        &self.manager
    }

    pub async fn cache<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> StateResult<RemoteCache<K, V>> {
        self.manager
            .get_or_create_cache(spec.name, &spec.remote_definition())
            .await?;
        debug!(cache = spec.name, "remote cache ready");
        Ok(RemoteCache {
            manager: Arc::clone(&self.manager),
            name: spec.name,
            _types: PhantomData,
        })
    }
}

/// One typed cache on the remote cluster.
pub struct RemoteCache<K, V> {
    manager: Arc<dyn RemoteCacheManager>,
    name: &'static str,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: CacheKey, V: CacheValue> RemoteCache<K, V> {
    fn to_document(value: &V) -> StateResult<Value> {
        let mut doc =
            serde_json::to_value(value).map_err(|e| StateError::Serialize(e.to_string()))?;
        if let (Some(type_name), Value::Object(map)) = (V::TYPE_NAME, &mut doc) {
            map.insert(TYPE_FIELD.to_string(), Value::String(type_name.to_string()));
        }
        Ok(doc)
    }

    fn from_document(mut doc: Value) -> StateResult<V> {
        if let Value::Object(map) = &mut doc {
            map.remove(TYPE_FIELD);
        }
        serde_json::from_value(doc).map_err(|e| StateError::Deserialize(e.to_string()))
    }

    fn from_documents(docs: Vec<Value>) -> StateResult<Vec<V>> {
        docs.into_iter().map(Self::from_document).collect()
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> CacheHandle<K, V> for RemoteCache<K, V> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &K) -> StateResult<Option<V>> {
        match self.manager.get(self.name, &RemoteKey::of(key)).await? {
            Some(doc) => Ok(Some(Self::from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &K, value: &V) -> StateResult<()> {
        let doc = Self::to_document(value)?;
        self.manager.put(self.name, &RemoteKey::of(key), &doc).await?;
        debug!(cache = self.name, %key, "entry stored");
        Ok(())
    }

    async fn put_if_absent(&self, key: &K, value: &V) -> StateResult<bool> {
        let doc = Self::to_document(value)?;
        let inserted = self
            .manager
            .put_if_absent(self.name, &RemoteKey::of(key), &doc)
            .await?;
        debug!(cache = self.name, %key, inserted, "conditional insert");
        Ok(inserted)
    }

    async fn remove(&self, key: &K) -> StateResult<()> {
        self.manager.remove(self.name, &RemoteKey::of(key)).await?;
        debug!(cache = self.name, %key, "entry removed");
        Ok(())
    }

    async fn clear(&self) -> StateResult<()> {
        self.manager.clear(self.name).await?;
        debug!(cache = self.name, "cache cleared");
        Ok(())
    }

    async fn values(&self) -> StateResult<Vec<V>> {
        Self::from_documents(self.manager.values(self.name).await?)
    }

    async fn query(&self, query: &FieldQuery) -> StateResult<Vec<V>> {
        let docs = self
            .manager
            .query(self.name, &query.query_string(), &query.params())
            .await?;
        Self::from_documents(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::loopback::LoopbackCacheManager;
    use crate::catalog::{DEPLOYMENT_STATUSES, RUNNER_STATUSES};
    use crate::key::GroupedKey;
    use crate::types::{DeploymentStatus, Grouped};

    #[tokio::test]
    async fn documents_are_tagged_with_type() {
        let manager = Arc::new(LoopbackCacheManager::new());
        let backend = RemoteBackend::new(manager.clone());
        let cache = backend
            .cache::<GroupedKey, DeploymentStatus>(&DEPLOYMENT_STATUSES)
            .await
            .unwrap();
        let status = DeploymentStatus::new("api", "ns", "local", "dev");

        cache.put(&status.grouped_key(), &status).await.unwrap();

        let raw = manager
            .get("deployment_statuses", &RemoteKey::of(&status.grouped_key()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw[TYPE_FIELD], "karavan.DeploymentStatus");
        assert_eq!(cache.get(&status.grouped_key()).await.unwrap(), Some(status));
    }

    #[tokio::test]
    async fn scalar_values_stay_plain_strings() {
        let manager = Arc::new(LoopbackCacheManager::new());
        let backend = RemoteBackend::new(manager.clone());
        let cache = backend
            .cache::<GroupedKey, String>(&RUNNER_STATUSES)
            .await
            .unwrap();
        let key = GroupedKey::create("pod-1", "memory");

        cache.put(&key, &"{\"used\":1}".to_string()).await.unwrap();

        let raw = manager
            .get("runner_statuses", &RemoteKey::of(&key))
            .await
            .unwrap();
        assert_eq!(raw, Some(Value::String("{\"used\":1}".to_string())));
    }

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let manager = Arc::new(LoopbackCacheManager::new());
        let backend = RemoteBackend::new(manager.clone());
        backend.cache::<GroupedKey, String>(&RUNNER_STATUSES).await.unwrap();
        backend.cache::<GroupedKey, String>(&RUNNER_STATUSES).await.unwrap();
        assert_eq!(manager.cache_names().await, vec!["runner_statuses".to_string()]);
    }
}
