//! Cache handles: one capability interface, two backends.
//!
//! [`CacheHandle`] is everything the status store needs from a named cache.
//! [`Backend`] is chosen once at start-up (embedded redb file, or a remote
//! clustered cache) and provisions the whole catalog into a typed
//! [`Caches`] set. Business code never asks which backend it is talking to.

pub mod embedded;
pub mod loopback;
pub mod remote;
pub mod rest;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::info;

use crate::catalog::{self, CacheSpec};
use crate::error::{StateError, StateResult};
use crate::key::{CacheKey, GroupedKey};
use crate::query::FieldQuery;
use crate::types::*;

pub use embedded::{EmbeddedBackend, EmbeddedCache};
pub use loopback::LoopbackCacheManager;
pub use remote::{RemoteBackend, RemoteCache, RemoteCacheManager, RemoteKey};
pub use rest::RestCacheManager;

/// Capabilities of a single named cache.
///
/// `get` on a missing key is `Ok(None)`; `remove` of a missing key is a
/// no-op. `query` evaluates a [`FieldQuery`] wherever the backend can: in
/// process for the embedded store, on the server for the remote one.
#[async_trait]
pub trait CacheHandle<K, V>: Send + Sync
where
    K: CacheKey,
    V: CacheValue,
{
    fn name(&self) -> &'static str;

    async fn get(&self, key: &K) -> StateResult<Option<V>>;

    async fn contains_key(&self, key: &K) -> StateResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn put(&self, key: &K, value: &V) -> StateResult<()>;

    /// Store only when `key` is absent. Returns whether the value was stored.
    async fn put_if_absent(&self, key: &K, value: &V) -> StateResult<bool>;

    async fn remove(&self, key: &K) -> StateResult<()>;

    async fn clear(&self) -> StateResult<()>;

    async fn values(&self) -> StateResult<Vec<V>>;

    async fn query(&self, query: &FieldQuery) -> StateResult<Vec<V>>;
}

/// Shared handle to a typed cache.
pub type Cache<K, V> = Arc<dyn CacheHandle<K, V>>;

/// Start clearing `cache` on its own task and return immediately.
pub fn clear_async<K: CacheKey, V: CacheValue>(
    cache: &Cache<K, V>,
) -> (&'static str, JoinHandle<StateResult<()>>) {
    let cache = Arc::clone(cache);
    (cache.name(), tokio::spawn(async move { cache.clear().await }))
}

/// Which backend the process runs on. Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Embedded,
    Remote,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Embedded => f.write_str("embedded"),
            Mode::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Clone)]
pub enum Backend {
    Embedded(EmbeddedBackend),
    Remote(RemoteBackend),
}

impl Backend {
    pub fn mode(&self) -> Mode {
        match self {
            Backend::Embedded(_) => Mode::Embedded,
            Backend::Remote(_) => Mode::Remote,
        }
    }

    /// Get-or-create one cache. Any failure is reported as `Provisioning`.
    pub async fn open<K: CacheKey, V: CacheValue>(
        &self,
        spec: &CacheSpec,
    ) -> StateResult<Cache<K, V>> {
        let opened: StateResult<Cache<K, V>> = match self {
            Backend::Embedded(backend) => backend
                .cache::<K, V>(spec)
                .map(|c| Arc::new(c) as Cache<K, V>),
            Backend::Remote(backend) => backend
                .cache::<K, V>(spec)
                .await
                .map(|c| Arc::new(c) as Cache<K, V>),
        };
        opened.map_err(|e| match e {
            e @ StateError::Provisioning { .. } => e,
            other => StateError::Provisioning {
                cache: spec.name.to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Provision every catalog cache, in catalog order.
    pub async fn provision(&self) -> StateResult<Caches> {
        let caches = Caches {
            environments: self.open(&catalog::ENVIRONMENTS).await?,
            projects: self.open(&catalog::PROJECTS).await?,
            files: self.open(&catalog::FILES).await?,
            pipeline_statuses: self.open(&catalog::PIPELINE_STATUSES).await?,
            deployment_statuses: self.open(&catalog::DEPLOYMENT_STATUSES).await?,
            pod_statuses: self.open(&catalog::POD_STATUSES).await?,
            service_statuses: self.open(&catalog::SERVICE_STATUSES).await?,
            camel_statuses: self.open(&catalog::CAMEL_STATUSES).await?,
            commits: self.open(&catalog::COMMITS).await?,
            runner_statuses: self.open(&catalog::RUNNER_STATUSES).await?,
        };
        info!(mode = %self.mode(), count = catalog::CATALOG.len(), "caches provisioned");
        Ok(caches)
    }
}

/// Typed handles for every cache in the catalog.
#[derive(Clone)]
pub struct Caches {
    pub environments: Cache<String, Environment>,
    pub projects: Cache<GroupedKey, Project>,
    pub files: Cache<GroupedKey, ProjectFile>,
    pub pipeline_statuses: Cache<GroupedKey, PipelineStatus>,
    pub deployment_statuses: Cache<GroupedKey, DeploymentStatus>,
    pub pod_statuses: Cache<GroupedKey, PodStatus>,
    pub service_statuses: Cache<GroupedKey, ServiceStatus>,
    pub camel_statuses: Cache<GroupedKey, CamelStatus>,
    pub commits: Cache<String, String>,
    pub runner_statuses: Cache<GroupedKey, String>,
}

impl Caches {
    /// Start clearing every cache whose catalog entry satisfies `select`.
    pub fn clear_async_where(
        &self,
        select: impl Fn(&CacheSpec) -> bool,
    ) -> Vec<(&'static str, JoinHandle<StateResult<()>>)> {
        let wanted = |name: &str| catalog::spec_for(name).is_some_and(&select);
        let mut pending = Vec::new();
        macro_rules! fan_out {
            ($($field:ident),*) => {$(
                if wanted(self.$field.name()) {
                    pending.push(clear_async(&self.$field));
                }
            )*};
        }
        fan_out!(
            environments,
            projects,
            files,
            pipeline_statuses,
            deployment_statuses,
            pod_statuses,
            service_statuses,
            camel_statuses,
            commits,
            runner_statuses
        );
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedded_provisions_whole_catalog() {
        let backend = Backend::Embedded(EmbeddedBackend::open_in_memory().unwrap());
        assert_eq!(backend.mode(), Mode::Embedded);
        let caches = backend.provision().await.unwrap();
        assert_eq!(caches.projects.name(), "projects");
        assert_eq!(caches.runner_statuses.name(), "runner_statuses");
    }

    #[tokio::test]
    async fn remote_provisions_whole_catalog() {
        let manager = Arc::new(LoopbackCacheManager::new());
        let backend = Backend::Remote(RemoteBackend::new(manager.clone()));
        assert_eq!(backend.mode(), Mode::Remote);
        backend.provision().await.unwrap();

        let mut expected: Vec<_> = catalog::CATALOG.iter().map(|s| s.name.to_string()).collect();
        expected.sort();
        assert_eq!(manager.cache_names().await, expected);
        assert_eq!(
            manager.definition("files").await.unwrap(),
            catalog::FILES.remote_definition()
        );
    }

    #[tokio::test]
    async fn provisioning_failure_names_the_cache() {
        let manager = Arc::new(LoopbackCacheManager::new());
        manager.fail_cache("pod_statuses").await;
        let backend = Backend::Remote(RemoteBackend::new(manager));
        let err = backend.provision().await.err().unwrap();
        match err {
            StateError::Provisioning { cache, .. } => assert_eq!(cache, "pod_statuses"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn clear_async_where_selects_by_catalog() {
        let backend = Backend::Embedded(EmbeddedBackend::open_in_memory().unwrap());
        let caches = backend.provision().await.unwrap();
        let pending = caches.clear_async_where(|spec| spec.is_status());
        let mut names: Vec<_> = pending.iter().map(|(name, _)| *name).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "camel_statuses",
                "deployment_statuses",
                "pipeline_statuses",
                "pod_statuses",
                "runner_statuses",
            ]
        );
        for (_, handle) in pending {
            handle.await.unwrap().unwrap();
        }
    }
}
