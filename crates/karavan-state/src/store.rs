//! StatusStore: typed façade over the cache catalog.
//!
//! Every operation derives its [`GroupedKey`] from entity fields (never
//! from a caller-supplied key), writes are unconditional upserts, and
//! deleting a missing entry is a no-op. The store is `Clone` and can be
//! shared across request tasks; the caches provide per-key atomicity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{Backend, Caches, Mode};
use crate::catalog::CacheSpec;
use crate::error::{CacheFailure, StateError, StateResult};
use crate::key::GroupedKey;
use crate::query::FieldQuery;
use crate::template::{APPLICATION_PROPERTIES_FILENAME, PropertiesTemplate};
use crate::types::*;

/// Pointer entry in the commits cache naming the most recent commit.
pub const LAST_COMMIT_KEY: &str = "lastCommitId";

/// One async mutex per group id, dropped once nobody holds or waits on it.
#[derive(Default)]
struct GroupLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GroupLocks {
    async fn lock(&self, group: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(group.to_string()).or_default())
        };
        mutex.lock_owned().await
    }
}

#[derive(Clone)]
pub struct StatusStore {
    caches: Caches,
    mode: Mode,
    template: Arc<PropertiesTemplate>,
    project_locks: Arc<GroupLocks>,
}

impl StatusStore {
    pub fn new(caches: Caches, mode: Mode) -> Self {
        Self {
            caches,
            mode,
            template: Arc::new(PropertiesTemplate::default()),
            project_locks: Arc::new(GroupLocks::default()),
        }
    }

    /// Provision every cache on `backend` and wrap them.
    pub async fn provision(backend: &Backend) -> StateResult<Self> {
        Ok(Self::new(backend.provision().await?, backend.mode()))
    }

    /// Use `template` for companion files of newly created projects.
    pub fn with_template(mut self, template: PropertiesTemplate) -> Self {
        self.template = Arc::new(template);
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    // ── Projects ───────────────────────────────────────────────────

    pub async fn get_projects(&self) -> StateResult<Vec<Project>> {
        self.caches.projects.values().await
    }

    pub async fn get_project(&self, project_id: &str) -> StateResult<Option<Project>> {
        self.caches
            .projects
            .get(&GroupedKey::create(project_id, project_id))
            .await
    }

    /// Upsert a project. The first save of a project that was not imported
    /// also creates its companion `application.properties`.
    ///
    /// Saves of the same project id are serialized in-process, and the
    /// companion file is written with put-if-absent, so it is created at
    /// most once even when another node races on the same project.
    pub async fn save_project(&self, project: &Project, imported: bool) -> StateResult<()> {
        let _guard = self.project_locks.lock(&project.project_id).await;
        let key = project.grouped_key();
        let is_new = !self.caches.projects.contains_key(&key).await?;

        let mut companion = None;
        if is_new && !imported {
            let mut file = ProjectFile::new(
                APPLICATION_PROPERTIES_FILENAME,
                self.template.render(project),
                &project.project_id,
            );
            file.last_update = now_millis();
            let file_key = file.grouped_key();
            if self.caches.files.put_if_absent(&file_key, &file).await? {
                companion = Some(file_key);
            }
        }

        if let Err(e) = self.caches.projects.put(&key, project).await {
            if let Some(file_key) = companion {
                if let Err(rollback) = self.caches.files.remove(&file_key).await {
                    warn!(%file_key, error = %rollback, "companion file rollback failed");
                }
            }
            return Err(e);
        }

        if is_new {
            info!(project_id = %project.project_id, imported, "project created");
        }
        Ok(())
    }

    pub async fn delete_project(&self, project_id: &str) -> StateResult<()> {
        self.caches
            .projects
            .remove(&GroupedKey::create(project_id, project_id))
            .await
    }

    // ── Project files ──────────────────────────────────────────────

    pub async fn get_project_files(&self, project_id: &str) -> StateResult<Vec<ProjectFile>> {
        let query = FieldQuery::from_type("karavan.ProjectFile").eq("projectId", project_id);
        self.caches.files.query(&query).await
    }

    pub async fn get_project_file(
        &self,
        project_id: &str,
        filename: &str,
    ) -> StateResult<Option<ProjectFile>> {
        self.caches
            .files
            .get(&GroupedKey::create(project_id, filename))
            .await
    }

    /// Upsert a file, stamping `last_update`. Returns the stored record.
    pub async fn save_project_file(&self, mut file: ProjectFile) -> StateResult<ProjectFile> {
        file.last_update = now_millis();
        self.caches.files.put(&file.grouped_key(), &file).await?;
        Ok(file)
    }

    /// Upsert a batch of files, stamping each with the same `last_update`.
    pub async fn save_project_files(
        &self,
        files: impl IntoIterator<Item = ProjectFile>,
    ) -> StateResult<Vec<ProjectFile>> {
        let now = now_millis();
        let mut saved = Vec::new();
        for mut file in files {
            file.last_update = now;
            self.caches.files.put(&file.grouped_key(), &file).await?;
            saved.push(file);
        }
        debug!(count = saved.len(), "project files stored");
        Ok(saved)
    }

    pub async fn delete_project_file(&self, project_id: &str, filename: &str) -> StateResult<()> {
        self.caches
            .files
            .remove(&GroupedKey::create(project_id, filename))
            .await
    }

    // ── Pipeline statuses ──────────────────────────────────────────

    pub async fn get_pipeline_status(
        &self,
        project_id: &str,
        env: &str,
    ) -> StateResult<Option<PipelineStatus>> {
        self.caches
            .pipeline_statuses
            .get(&GroupedKey::create(project_id, env))
            .await
    }

    pub async fn save_pipeline_status(&self, status: &PipelineStatus) -> StateResult<()> {
        self.caches
            .pipeline_statuses
            .put(&status.grouped_key(), status)
            .await
    }

    pub async fn delete_pipeline_status(&self, project_id: &str, env: &str) -> StateResult<()> {
        self.caches
            .pipeline_statuses
            .remove(&GroupedKey::create(project_id, env))
            .await
    }

    // ── Deployment statuses ────────────────────────────────────────

    pub async fn get_deployment_status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &str,
    ) -> StateResult<Option<DeploymentStatus>> {
        let key = GroupedKey::create(name, resource_id(name, namespace, cluster));
        self.caches.deployment_statuses.get(&key).await
    }

    pub async fn get_deployment_statuses(&self) -> StateResult<Vec<DeploymentStatus>> {
        self.caches.deployment_statuses.values().await
    }

    pub async fn get_deployment_statuses_by_env(
        &self,
        env: &str,
    ) -> StateResult<Vec<DeploymentStatus>> {
        let query = FieldQuery::from_type("karavan.DeploymentStatus").eq("env", env);
        self.caches.deployment_statuses.query(&query).await
    }

    /// Upsert a deployment status; its `id` is recomputed from name,
    /// namespace and cluster so lookups always find it.
    pub async fn save_deployment_status(&self, status: &DeploymentStatus) -> StateResult<()> {
        let mut status = status.clone();
        status.id = status.derived_id();
        self.caches
            .deployment_statuses
            .put(&status.grouped_key(), &status)
            .await
    }

    pub async fn delete_deployment_status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &str,
    ) -> StateResult<()> {
        let key = GroupedKey::create(name, resource_id(name, namespace, cluster));
        self.caches.deployment_statuses.remove(&key).await
    }

    // ── Service statuses ───────────────────────────────────────────

    pub async fn get_service_status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &str,
    ) -> StateResult<Option<ServiceStatus>> {
        let key = GroupedKey::create(name, resource_id(name, namespace, cluster));
        self.caches.service_statuses.get(&key).await
    }

    pub async fn get_service_statuses(&self) -> StateResult<Vec<ServiceStatus>> {
        self.caches.service_statuses.values().await
    }

    pub async fn save_service_status(&self, status: &ServiceStatus) -> StateResult<()> {
        let mut status = status.clone();
        status.id = status.derived_id();
        self.caches
            .service_statuses
            .put(&status.grouped_key(), &status)
            .await
    }

    pub async fn delete_service_status(
        &self,
        name: &str,
        namespace: &str,
        cluster: &str,
    ) -> StateResult<()> {
        let key = GroupedKey::create(name, resource_id(name, namespace, cluster));
        self.caches.service_statuses.remove(&key).await
    }

    // ── Pod statuses ───────────────────────────────────────────────

    pub async fn get_pod_statuses(&self, project_id: &str, env: &str) -> StateResult<Vec<PodStatus>> {
        let query = FieldQuery::from_type("karavan.PodStatus")
            .eq("project", project_id)
            .eq("env", env);
        self.caches.pod_statuses.query(&query).await
    }

    pub async fn get_pod_statuses_by_env(&self, env: &str) -> StateResult<Vec<PodStatus>> {
        let query = FieldQuery::from_type("karavan.PodStatus").eq("env", env);
        self.caches.pod_statuses.query(&query).await
    }

    pub async fn save_pod_status(&self, status: &PodStatus) -> StateResult<()> {
        self.caches
            .pod_statuses
            .put(&status.grouped_key(), status)
            .await
    }

    pub async fn delete_pod_status(&self, project_id: &str, pod_name: &str) -> StateResult<()> {
        self.caches
            .pod_statuses
            .remove(&GroupedKey::create(project_id, pod_name))
            .await
    }

    // ── Camel statuses ─────────────────────────────────────────────

    pub async fn get_camel_status(
        &self,
        project_id: &str,
        env: &str,
    ) -> StateResult<Option<CamelStatus>> {
        self.caches
            .camel_statuses
            .get(&GroupedKey::create(project_id, env))
            .await
    }

    pub async fn get_camel_statuses(&self, env: &str) -> StateResult<Vec<CamelStatus>> {
        let query = FieldQuery::from_type("karavan.CamelStatus").eq("env", env);
        self.caches.camel_statuses.query(&query).await
    }

    pub async fn save_camel_status(&self, status: &CamelStatus) -> StateResult<()> {
        self.caches
            .camel_statuses
            .put(&status.grouped_key(), status)
            .await
    }

    pub async fn delete_camel_status(&self, project_id: &str, env: &str) -> StateResult<()> {
        self.caches
            .camel_statuses
            .remove(&GroupedKey::create(project_id, env))
            .await
    }

    // ── Runner statuses ────────────────────────────────────────────
    //
    // `status_name` is either a `RunnerStatusName` or an ad-hoc string.

    pub async fn get_runner_status(
        &self,
        pod_name: &str,
        status_name: impl AsRef<str>,
    ) -> StateResult<Option<String>> {
        self.caches
            .runner_statuses
            .get(&GroupedKey::create(pod_name, status_name.as_ref()))
            .await
    }

    pub async fn save_runner_status(
        &self,
        pod_name: &str,
        status_name: impl AsRef<str>,
        status: impl Into<String>,
    ) -> StateResult<()> {
        self.caches
            .runner_statuses
            .put(&GroupedKey::create(pod_name, status_name.as_ref()), &status.into())
            .await
    }

    pub async fn delete_runner_status(
        &self,
        pod_name: &str,
        status_name: impl AsRef<str>,
    ) -> StateResult<()> {
        self.caches
            .runner_statuses
            .remove(&GroupedKey::create(pod_name, status_name.as_ref()))
            .await
    }

    /// Remove every well-known runner status of a pod. Ad-hoc names stay.
    pub async fn delete_runner_statuses(&self, pod_name: &str) -> StateResult<()> {
        for name in RunnerStatusName::ALL {
            self.delete_runner_status(pod_name, name).await?;
        }
        Ok(())
    }

    // ── Environments ───────────────────────────────────────────────

    pub async fn get_environments(&self) -> StateResult<Vec<Environment>> {
        self.caches.environments.values().await
    }

    pub async fn save_environment(&self, environment: &Environment) -> StateResult<()> {
        self.caches
            .environments
            .put(&environment.name, environment)
            .await
    }

    // ── Commits ────────────────────────────────────────────────────

    pub async fn save_commit(&self, commit_id: &str, time: i64) -> StateResult<()> {
        self.caches
            .commits
            .put(&commit_id.to_string(), &time.to_string())
            .await
    }

    pub async fn save_last_commit(&self, commit_id: &str) -> StateResult<()> {
        self.caches
            .commits
            .put(&LAST_COMMIT_KEY.to_string(), &commit_id.to_string())
            .await
    }

    /// Resolve the last-commit pointer, then that commit's time.
    pub async fn get_last_commit(&self) -> StateResult<LastCommit> {
        let Some(commit_id) = self.caches.commits.get(&LAST_COMMIT_KEY.to_string()).await? else {
            return Err(StateError::NotFound("no last commit recorded".to_string()));
        };
        let Some(time) = self.caches.commits.get(&commit_id).await? else {
            return Err(StateError::Inconsistent(format!(
                "last commit {commit_id} has no recorded time"
            )));
        };
        let time = time.trim().parse::<i64>().map_err(|e| {
            StateError::Inconsistent(format!("commit {commit_id} has invalid time {time:?}: {e}"))
        })?;
        Ok(LastCommit { commit_id, time })
    }

    pub async fn has_commit(&self, commit_id: &str) -> StateResult<bool> {
        self.caches.commits.contains_key(&commit_id.to_string()).await
    }

    // ── Bulk maintenance ───────────────────────────────────────────

    /// Clear the five status caches concurrently and wait for all of them.
    ///
    /// Best-effort: caches that cleared stay cleared; failures are returned
    /// together as `PartialFailure`.
    pub async fn clear_all_statuses(&self) -> StateResult<()> {
        let pending = self.caches.clear_async_where(CacheSpec::is_status);
        join_clears(pending, "status").await
    }

    /// Clear every volatile cache (statuses and environments). Projects,
    /// files and commits are kept.
    pub async fn reset_volatile(&self) -> StateResult<()> {
        let pending = self.caches.clear_async_where(CacheSpec::is_volatile);
        join_clears(pending, "volatile").await
    }
}

async fn join_clears(
    pending: Vec<(&'static str, JoinHandle<StateResult<()>>)>,
    scope: &str,
) -> StateResult<()> {
    let (names, handles): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
    let results = join_all(handles).await;

    let failed: Vec<CacheFailure> = names
        .iter()
        .zip(results)
        .filter_map(|(name, result)| {
            let reason = match result {
                Ok(Ok(())) => return None,
                Ok(Err(e)) => e.to_string(),
                Err(join) => format!("clear task aborted: {join}"),
            };
            Some(CacheFailure {
                cache: name.to_string(),
                reason,
            })
        })
        .collect();

    if failed.is_empty() {
        info!(scope, caches = ?names, "caches cleared");
        Ok(())
    } else {
        let err = StateError::PartialFailure { failed };
        warn!(scope, error = %err, "caches not fully cleared");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EmbeddedBackend;

    async fn test_store() -> StatusStore {
        let backend = Backend::Embedded(EmbeddedBackend::open_in_memory().unwrap());
        StatusStore::provision(&backend).await.unwrap()
    }

    fn test_project(id: &str) -> Project {
        Project::new(id, format!("{id} name"), "test project", "quarkus")
    }

    // ── Projects ───────────────────────────────────────────────────

    #[tokio::test]
    async fn project_save_and_get() {
        let store = test_store().await;
        let project = test_project("demo");

        store.save_project(&project, false).await.unwrap();

        assert_eq!(store.get_project("demo").await.unwrap(), Some(project));
        assert_eq!(store.get_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn new_project_gets_companion_file() {
        let store = test_store().await;
        store.save_project(&test_project("demo"), false).await.unwrap();

        let file = store
            .get_project_file("demo", APPLICATION_PROPERTIES_FILENAME)
            .await
            .unwrap()
            .unwrap();
        assert!(file.code.contains("camel.karavan.project-id=demo"));
        assert!(file.last_update > 0);
    }

    #[tokio::test]
    async fn resave_keeps_edited_companion() {
        let store = test_store().await;
        let mut project = test_project("demo");
        store.save_project(&project, false).await.unwrap();
        store
            .save_project_file(ProjectFile::new(APPLICATION_PROPERTIES_FILENAME, "edited", "demo"))
            .await
            .unwrap();

        project.description = "changed".to_string();
        store.save_project(&project, false).await.unwrap();

        let files = store.get_project_files("demo").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].code, "edited");
        assert_eq!(store.get_project("demo").await.unwrap().unwrap().description, "changed");
    }

    #[tokio::test]
    async fn imported_project_has_no_companion() {
        let store = test_store().await;
        store.save_project(&test_project("imported"), true).await.unwrap();
        assert!(store.get_project_files("imported").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_template_is_used() {
        let store = test_store()
            .await
            .with_template(PropertiesTemplate::new("name={projectName}"));
        store.save_project(&test_project("t"), false).await.unwrap();
        let file = store
            .get_project_file("t", APPLICATION_PROPERTIES_FILENAME)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.code, "name=t name");
    }

    #[tokio::test]
    async fn concurrent_first_saves_create_one_companion() {
        let store = test_store().await;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.save_project(&test_project("race"), false).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get_project_files("race").await.unwrap().len(), 1);
        assert_eq!(store.get_projects().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn project_delete_is_idempotent() {
        let store = test_store().await;
        store.save_project(&test_project("demo"), true).await.unwrap();
        store.delete_project("demo").await.unwrap();
        store.delete_project("demo").await.unwrap();
        assert!(store.get_project("demo").await.unwrap().is_none());
    }

    // ── Files ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn missing_file_is_none_not_empty_record() {
        let store = test_store().await;
        assert!(store.get_project_file("demo", "nope.yaml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_save_stamps_last_update() {
        let store = test_store().await;
        let saved = store
            .save_project_file(ProjectFile::new("route.yaml", "- from:", "demo"))
            .await
            .unwrap();
        assert!(saved.last_update > 0);
        assert_eq!(
            store.get_project_file("demo", "route.yaml").await.unwrap(),
            Some(saved)
        );
    }

    #[tokio::test]
    async fn file_batch_save_and_filter_by_project() {
        let store = test_store().await;
        let saved = store
            .save_project_files(vec![
                ProjectFile::new("a.yaml", "a", "p1"),
                ProjectFile::new("b.yaml", "b", "p1"),
                ProjectFile::new("c.yaml", "c", "p2"),
            ])
            .await
            .unwrap();
        assert!(saved.iter().all(|f| f.last_update > 0));

        let mut names: Vec<_> = store
            .get_project_files("p1")
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.yaml", "b.yaml"]);

        store.delete_project_file("p1", "a.yaml").await.unwrap();
        assert_eq!(store.get_project_files("p1").await.unwrap().len(), 1);
    }

    // ── Statuses ───────────────────────────────────────────────────

    #[tokio::test]
    async fn deployment_status_id_is_recomputed() {
        let store = test_store().await;
        let mut status = DeploymentStatus::new("api", "karavan", "local", "dev");
        status.id = "stale".to_string();
        status.replicas = 2;

        store.save_deployment_status(&status).await.unwrap();

        let stored = store
            .get_deployment_status("api", "karavan", "local")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, "api:karavan:local");
        assert_eq!(stored.replicas, 2);

        store.delete_deployment_status("api", "karavan", "local").await.unwrap();
        assert!(store.get_deployment_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deployment_statuses_by_env() {
        let store = test_store().await;
        for (name, env) in [("a", "dev"), ("b", "dev"), ("c", "prod")] {
            store
                .save_deployment_status(&DeploymentStatus::new(name, "ns", "local", env))
                .await
                .unwrap();
        }
        assert_eq!(store.get_deployment_statuses_by_env("dev").await.unwrap().len(), 2);
        assert_eq!(store.get_deployment_statuses_by_env("test").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn service_status_crud() {
        let store = test_store().await;
        let mut svc = ServiceStatus::new("api", "ns", "local", "dev");
        svc.port = 8080;
        store.save_service_status(&svc).await.unwrap();

        assert_eq!(
            store.get_service_status("api", "ns", "local").await.unwrap(),
            Some(svc)
        );
        assert_eq!(store.get_service_statuses().await.unwrap().len(), 1);

        store.delete_service_status("api", "ns", "local").await.unwrap();
        assert!(store.get_service_statuses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pod_statuses_filtering() {
        let store = test_store().await;
        for (name, project, env) in [
            ("p1-a", "p1", "dev"),
            ("p1-b", "p1", "prod"),
            ("p2-a", "p2", "dev"),
        ] {
            store.save_pod_status(&PodStatus::new(name, project, env)).await.unwrap();
        }

        assert_eq!(store.get_pod_statuses("p1", "dev").await.unwrap().len(), 1);
        assert_eq!(store.get_pod_statuses_by_env("dev").await.unwrap().len(), 2);

        store.delete_pod_status("p1", "p1-a").await.unwrap();
        assert!(store.get_pod_statuses("p1", "dev").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pipeline_and_camel_statuses() {
        let store = test_store().await;
        let pipeline = PipelineStatus {
            project_id: "demo".to_string(),
            pipeline_name: "demo-build".to_string(),
            result: "Succeeded".to_string(),
            env: "dev".to_string(),
            ..Default::default()
        };
        store.save_pipeline_status(&pipeline).await.unwrap();
        assert_eq!(
            store.get_pipeline_status("demo", "dev").await.unwrap(),
            Some(pipeline)
        );
        store.delete_pipeline_status("demo", "dev").await.unwrap();
        assert!(store.get_pipeline_status("demo", "dev").await.unwrap().is_none());

        let camel = CamelStatus {
            project_id: "demo".to_string(),
            env: "dev".to_string(),
            statuses: vec![CamelStatusValue {
                name: "context".to_string(),
                status: "Started".to_string(),
            }],
        };
        store.save_camel_status(&camel).await.unwrap();
        assert_eq!(store.get_camel_status("demo", "dev").await.unwrap(), Some(camel));
        assert_eq!(store.get_camel_statuses("dev").await.unwrap().len(), 1);
        store.delete_camel_status("demo", "dev").await.unwrap();
        assert!(store.get_camel_statuses("dev").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn runner_statuses_typed_and_ad_hoc() {
        let store = test_store().await;
        store
            .save_runner_status("pod-1", RunnerStatusName::Memory, "{\"used\":10}")
            .await
            .unwrap();
        store
            .save_runner_status("pod-1", RunnerStatusName::Context, "{}")
            .await
            .unwrap();
        store.save_runner_status("pod-1", "custom", "x").await.unwrap();

        assert_eq!(
            store
                .get_runner_status("pod-1", RunnerStatusName::Memory)
                .await
                .unwrap()
                .as_deref(),
            Some("{\"used\":10}")
        );
        assert_eq!(
            store.get_runner_status("pod-1", "memory").await.unwrap().as_deref(),
            Some("{\"used\":10}")
        );

        store.delete_runner_statuses("pod-1").await.unwrap();
        assert!(store.get_runner_status("pod-1", RunnerStatusName::Context).await.unwrap().is_none());
        assert_eq!(
            store.get_runner_status("pod-1", "custom").await.unwrap().as_deref(),
            Some("x")
        );

        store.delete_runner_status("pod-1", "custom").await.unwrap();
        assert!(store.get_runner_status("pod-1", "custom").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn environments_are_keyed_by_name() {
        let store = test_store().await;
        let mut env = Environment {
            name: "dev".to_string(),
            cluster: "local".to_string(),
            namespace: "karavan".to_string(),
            cicd: "tekton".to_string(),
        };
        store.save_environment(&env).await.unwrap();
        env.namespace = "karavan-dev".to_string();
        store.save_environment(&env).await.unwrap();

        assert_eq!(store.get_environments().await.unwrap(), vec![env]);
    }

    // ── Commits ────────────────────────────────────────────────────

    #[tokio::test]
    async fn last_commit_round_trip() {
        let store = test_store().await;
        store.save_commit("abc123", 1_700_000_000).await.unwrap();
        store.save_last_commit("abc123").await.unwrap();

        assert!(store.has_commit("abc123").await.unwrap());
        assert!(!store.has_commit("def456").await.unwrap());
        assert_eq!(
            store.get_last_commit().await.unwrap(),
            LastCommit {
                commit_id: "abc123".to_string(),
                time: 1_700_000_000,
            }
        );
    }

    #[tokio::test]
    async fn last_commit_without_any_commit_is_not_found() {
        let store = test_store().await;
        assert!(matches!(
            store.get_last_commit().await,
            Err(StateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dangling_last_commit_pointer_is_inconsistent() {
        let store = test_store().await;
        store.save_last_commit("ghost").await.unwrap();
        assert!(matches!(
            store.get_last_commit().await,
            Err(StateError::Inconsistent(_))
        ));
    }

    // ── Bulk maintenance ───────────────────────────────────────────

    #[tokio::test]
    async fn reset_volatile_keeps_durable_caches() {
        let store = test_store().await;
        store.save_project(&test_project("demo"), false).await.unwrap();
        store.save_commit("c1", 1).await.unwrap();
        store
            .save_environment(&Environment {
                name: "dev".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
            .save_service_status(&ServiceStatus::new("svc", "ns", "local", "dev"))
            .await
            .unwrap();
        store.save_pod_status(&PodStatus::new("pod", "demo", "dev")).await.unwrap();

        store.reset_volatile().await.unwrap();

        assert!(store.get_environments().await.unwrap().is_empty());
        assert!(store.get_service_statuses().await.unwrap().is_empty());
        assert!(store.get_pod_statuses_by_env("dev").await.unwrap().is_empty());
        assert_eq!(store.get_projects().await.unwrap().len(), 1);
        assert_eq!(store.get_project_files("demo").await.unwrap().len(), 1);
        assert!(store.has_commit("c1").await.unwrap());
    }

    #[tokio::test]
    async fn group_locks_are_released() {
        let locks = GroupLocks::default();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        let _held = locks.lock("c").await;
        let map = locks.inner.lock().unwrap();
        // "a" was pruned when "b" was locked; "b" when "c" was locked.
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("c"));
    }
}
