//! Domain types persisted by the Karavan status store.
//!
//! Field names are camelCase on the wire: the remote cache indexes and
//! queries them by those names (`projectId`, `env`, ...), and the embedded
//! backend filters on the same serialized form.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::key::GroupedKey;

/// A value that can live in a cache.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Indexed message type on the remote server (`karavan.<Entity>`).
    /// `None` for scalar values, which are stored as plain text.
    const TYPE_NAME: Option<&'static str> = None;
}

impl CacheValue for String {}

/// An entity whose grouped key is derived from its own fields.
pub trait Grouped {
    fn grouped_key(&self) -> GroupedKey;
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Synthetic discriminator shared by deployment and service statuses.
pub fn resource_id(name: &str, namespace: &str, cluster: &str) -> String {
    format!("{name}:{namespace}:{cluster}")
}

// ── Project ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub runtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    pub last_commit_timestamp: i64,
}

impl Project {
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        runtime: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            description: description.into(),
            runtime: runtime.into(),
            last_commit: None,
            last_commit_timestamp: 0,
        }
    }
}

impl Grouped for Project {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.project_id, &self.project_id)
    }
}

impl CacheValue for Project {
    const TYPE_NAME: Option<&'static str> = Some("karavan.Project");
}

// ── ProjectFile ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectFile {
    pub name: String,
    pub code: String,
    pub project_id: String,
    /// Epoch millis of the last save; stamped by the store.
    pub last_update: i64,
}

impl ProjectFile {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            project_id: project_id.into(),
            last_update: 0,
        }
    }
}

impl Grouped for ProjectFile {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.project_id, &self.name)
    }
}

impl CacheValue for ProjectFile {
    const TYPE_NAME: Option<&'static str> = Some("karavan.ProjectFile");
}

// ── PipelineStatus ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineStatus {
    pub project_id: String,
    pub pipeline_name: String,
    pub result: String,
    pub start_time: String,
    pub completion_time: String,
    pub env: String,
}

impl Grouped for PipelineStatus {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.project_id, &self.env)
    }
}

impl CacheValue for PipelineStatus {
    const TYPE_NAME: Option<&'static str> = Some("karavan.PipelineStatus");
}

// ── DeploymentStatus ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentStatus {
    /// Always `name:namespace:cluster`; rewritten by the store on save.
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub env: String,
    pub cluster: String,
    pub image: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub unavailable_replicas: i32,
}

impl DeploymentStatus {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cluster: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        let mut status = Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster: cluster.into(),
            env: env.into(),
            ..Default::default()
        };
        status.id = status.derived_id();
        status
    }

    pub fn derived_id(&self) -> String {
        resource_id(&self.name, &self.namespace, &self.cluster)
    }
}

impl Grouped for DeploymentStatus {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.name, self.derived_id())
    }
}

impl CacheValue for DeploymentStatus {
    const TYPE_NAME: Option<&'static str> = Some("karavan.DeploymentStatus");
}

// ── ServiceStatus ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceStatus {
    /// Always `name:namespace:cluster`; rewritten by the store on save.
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub env: String,
    pub cluster: String,
    pub port: i32,
    pub target_port: i32,
    pub cluster_ip: String,
    #[serde(rename = "type")]
    pub service_type: String,
}

impl ServiceStatus {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        cluster: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        let mut status = Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster: cluster.into(),
            env: env.into(),
            ..Default::default()
        };
        status.id = status.derived_id();
        status
    }

    pub fn derived_id(&self) -> String {
        resource_id(&self.name, &self.namespace, &self.cluster)
    }
}

impl Grouped for ServiceStatus {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.name, self.derived_id())
    }
}

impl CacheValue for ServiceStatus {
    const TYPE_NAME: Option<&'static str> = Some("karavan.ServiceStatus");
}

// ── PodStatus ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    pub name: String,
    pub phase: String,
    pub initialized: bool,
    pub ready: bool,
    pub terminating: bool,
    pub reason: String,
    pub deployment: String,
    pub project: String,
    pub env: String,
    pub request_memory: String,
    pub request_cpu: String,
    pub limit_memory: String,
    pub limit_cpu: String,
    pub creation_timestamp: String,
}

impl PodStatus {
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        env: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            env: env.into(),
            ..Default::default()
        }
    }
}

impl Grouped for PodStatus {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.project, &self.name)
    }
}

impl CacheValue for PodStatus {
    const TYPE_NAME: Option<&'static str> = Some("karavan.PodStatus");
}

// ── CamelStatus ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CamelStatus {
    pub project_id: String,
    pub env: String,
    pub statuses: Vec<CamelStatusValue>,
}

/// One named runtime signal reported by a Camel context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CamelStatusValue {
    pub name: String,
    pub status: String,
}

impl Grouped for CamelStatus {
    fn grouped_key(&self) -> GroupedKey {
        GroupedKey::create(&self.project_id, &self.env)
    }
}

impl CacheValue for CamelStatus {
    const TYPE_NAME: Option<&'static str> = Some("karavan.CamelStatus");
}

// ── Environment ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub name: String,
    pub cluster: String,
    pub namespace: String,
    pub cicd: String,
}

impl CacheValue for Environment {
    const TYPE_NAME: Option<&'static str> = Some("karavan.Environment");
}

// ── Runner statuses ────────────────────────────────────────────────

/// Well-known runner signals. Ad-hoc names are stored as plain strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatusName {
    Context,
    Inflight,
    Memory,
    Properties,
    Route,
    Trace,
    Jvm,
}

impl RunnerStatusName {
    pub const ALL: [RunnerStatusName; 7] = [
        RunnerStatusName::Context,
        RunnerStatusName::Inflight,
        RunnerStatusName::Memory,
        RunnerStatusName::Properties,
        RunnerStatusName::Route,
        RunnerStatusName::Trace,
        RunnerStatusName::Jvm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerStatusName::Context => "context",
            RunnerStatusName::Inflight => "inflight",
            RunnerStatusName::Memory => "memory",
            RunnerStatusName::Properties => "properties",
            RunnerStatusName::Route => "route",
            RunnerStatusName::Trace => "trace",
            RunnerStatusName::Jvm => "jvm",
        }
    }
}

impl AsRef<str> for RunnerStatusName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RunnerStatusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunnerStatusName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunnerStatusName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| format!("unknown runner status name: {s}"))
    }
}

// ── Commits ────────────────────────────────────────────────────────

/// The most recently recorded commit and its commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastCommit {
    pub commit_id: String,
    pub time: i64,
}
