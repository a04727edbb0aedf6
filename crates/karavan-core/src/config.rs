//! karavan.toml configuration parser.
//!
//! Every section is optional. The presence of a `[remote]` section is what
//! selects the clustered cache backend; without it the store runs embedded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

/// Default persistent root for the embedded store.
pub const DEFAULT_DATA_DIR: &str = "karavan-data";

/// Default file name of the embedded single-file store.
pub const DEFAULT_STORE_FILE: &str = "karavan.redb";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KaravanConfig {
    pub store: StoreSection,
    pub remote: Option<RemoteSection>,
    pub health: HealthSection,
    pub project: ProjectSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSection {
    pub data_dir: PathBuf,
    pub file_name: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file_name: DEFAULT_STORE_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSection {
    /// Base URL of the cache server's REST endpoint, e.g. `http://infinispan:11222`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout (e.g. "5s").
    #[serde(default = "default_remote_timeout")]
    pub timeout: String,
}

fn default_remote_timeout() -> String {
    "5s".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthSection {
    /// Readiness monitor period (e.g. "10s").
    pub interval: String,
    /// Consecutive DOWN checks before the monitor reports unhealthy.
    pub unhealthy_threshold: u32,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectSection {
    /// Optional template file for the companion `application.properties`.
    pub properties_template: Option<PathBuf>,
}

impl KaravanConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: KaravanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject durations that would otherwise fail later, at start-up.
    pub fn validate(&self) -> anyhow::Result<()> {
        if parse_duration(&self.health.interval).is_none() {
            anyhow::bail!("invalid [health] interval: {:?}", self.health.interval);
        }
        if let Some(remote) = &self.remote {
            if parse_duration(&remote.timeout).is_none() {
                anyhow::bail!("invalid [remote] timeout: {:?}", remote.timeout);
            }
            if remote.url.trim().is_empty() {
                anyhow::bail!("[remote] url must not be empty");
            }
        }
        Ok(())
    }

    /// Full path of the embedded single-file store.
    pub fn store_path(&self) -> PathBuf {
        self.store.data_dir.join(&self.store.file_name)
    }

    pub fn health_interval(&self) -> Duration {
        parse_duration(&self.health.interval).unwrap_or(Duration::from_secs(10))
    }
}

impl RemoteSection {
    /// Anonymous access to `url` with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: default_remote_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(5))
    }
}
