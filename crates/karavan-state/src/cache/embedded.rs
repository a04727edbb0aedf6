//! Embedded cache handles backed by a single redb file.
//!
//! Each named cache is one redb table with `&str` keys (the encoded
//! [`CacheKey`]) and `&[u8]` values (JSON). There is no secondary index:
//! [`CacheHandle::query`] scans the table and filters the serialized
//! documents in-process.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde_json::Value;
use tracing::debug;

use crate::cache::CacheHandle;
use crate::catalog::CacheSpec;
use crate::error::{StateError, StateResult};
use crate::key::CacheKey;
use crate::query::FieldQuery;
use crate::types::CacheValue;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn table(name: &'static str) -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

/// Local single-file store shared by every embedded cache handle.
#[derive(Clone)]
pub struct EmbeddedBackend {
    db: Arc<Database>,
}

impl EmbeddedBackend {
    /// Open (or create) the persistent store file, creating parent directories.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        debug!(?path, "embedded store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory embedded store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Get-or-create the table for `spec` and return a typed handle onto it.
    pub fn cache<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> StateResult<EmbeddedCache<K, V>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(table(spec.name)).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(EmbeddedCache {
            db: Arc::clone(&self.db),
            name: spec.name,
            _types: PhantomData,
        })
    }
}

/// One typed cache inside the embedded store.
pub struct EmbeddedCache<K, V> {
    db: Arc<Database>,
    name: &'static str,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K: CacheKey, V: CacheValue> EmbeddedCache<K, V> {
    fn scan(&self, mut keep: impl FnMut(&Value) -> bool) -> StateResult<Vec<V>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table(self.name)).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let doc: Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&doc) {
                results.push(serde_json::from_value(doc).map_err(map_err!(Deserialize))?);
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> CacheHandle<K, V> for EmbeddedCache<K, V> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &K) -> StateResult<Option<V>> {
        let key = key.encode();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table(self.name)).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: V =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &K, value: &V) -> StateResult<()> {
        let encoded = key.encode();
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table(self.name)).map_err(map_err!(Table))?;
            table
                .insert(encoded.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cache = self.name, %key, "entry stored");
        Ok(())
    }

    async fn put_if_absent(&self, key: &K, value: &V) -> StateResult<bool> {
        let encoded = key.encode();
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        // redb serializes write transactions, so check-then-insert is atomic.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let inserted;
        {
            let mut table = txn.open_table(table(self.name)).map_err(map_err!(Table))?;
            inserted = table.get(encoded.as_str()).map_err(map_err!(Read))?.is_none();
            if inserted {
                table
                    .insert(encoded.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cache = self.name, %key, inserted, "conditional insert");
        Ok(inserted)
    }

    async fn remove(&self, key: &K) -> StateResult<()> {
        let encoded = key.encode();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table(self.name)).map_err(map_err!(Table))?;
            existed = table.remove(encoded.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cache = self.name, %key, existed, "entry removed");
        Ok(())
    }

    async fn clear(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.delete_table(table(self.name)).map_err(map_err!(Table))?;
        txn.open_table(table(self.name)).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cache = self.name, "cache cleared");
        Ok(())
    }

    async fn values(&self) -> StateResult<Vec<V>> {
        self.scan(|_| true)
    }

    async fn query(&self, query: &FieldQuery) -> StateResult<Vec<V>> {
        self.scan(|doc| query.matches(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{COMMITS, FILES, POD_STATUSES};
    use crate::key::GroupedKey;
    use crate::types::{Grouped, PodStatus, ProjectFile};

    #[tokio::test]
    async fn put_get_remove() {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let files = backend.cache::<GroupedKey, ProjectFile>(&FILES).unwrap();
        let file = ProjectFile::new("app.yaml", "- from:", "demo");

        files.put(&file.grouped_key(), &file).await.unwrap();
        assert_eq!(files.get(&file.grouped_key()).await.unwrap(), Some(file.clone()));
        assert!(files.contains_key(&file.grouped_key()).await.unwrap());

        files.remove(&file.grouped_key()).await.unwrap();
        files.remove(&file.grouped_key()).await.unwrap();
        assert!(files.get(&file.grouped_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_if_absent_only_inserts_once() {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let commits = backend.cache::<String, String>(&COMMITS).unwrap();
        let key = "abc".to_string();

        assert!(commits.put_if_absent(&key, &"1".to_string()).await.unwrap());
        assert!(!commits.put_if_absent(&key, &"2".to_string()).await.unwrap());
        assert_eq!(commits.get(&key).await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn query_filters_in_process() {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let pods = backend.cache::<GroupedKey, PodStatus>(&POD_STATUSES).unwrap();
        for (name, project, env) in [("a", "p1", "dev"), ("b", "p1", "prod"), ("c", "p2", "dev")] {
            let pod = PodStatus::new(name, project, env);
            pods.put(&pod.grouped_key(), &pod).await.unwrap();
        }

        let q = FieldQuery::from_type("karavan.PodStatus").eq("env", "dev");
        let mut names: Vec<_> = pods.query(&q).await.unwrap().into_iter().map(|p| p.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn clear_empties_only_that_cache() {
        let backend = EmbeddedBackend::open_in_memory().unwrap();
        let pods = backend.cache::<GroupedKey, PodStatus>(&POD_STATUSES).unwrap();
        let commits = backend.cache::<String, String>(&COMMITS).unwrap();
        let pod = PodStatus::new("a", "p", "dev");
        pods.put(&pod.grouped_key(), &pod).await.unwrap();
        commits.put(&"c1".to_string(), &"10".to_string()).await.unwrap();

        pods.clear().await.unwrap();
        assert!(pods.values().await.unwrap().is_empty());
        assert_eq!(commits.values().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("karavan.redb");
        let file = ProjectFile::new("app.yaml", "code", "demo");

        {
            let backend = EmbeddedBackend::open(&path).unwrap();
            let files = backend.cache::<GroupedKey, ProjectFile>(&FILES).unwrap();
            files.put(&file.grouped_key(), &file).await.unwrap();
        }

        let backend = EmbeddedBackend::open(&path).unwrap();
        let files = backend.cache::<GroupedKey, ProjectFile>(&FILES).unwrap();
        assert_eq!(files.get(&file.grouped_key()).await.unwrap(), Some(file));
    }
}
