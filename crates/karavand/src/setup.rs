//! Wiring from configuration to a lifecycle controller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use karavan_core::{KaravanConfig, RemoteSection};
use karavan_health::LifecycleController;
use karavan_state::cache::{EmbeddedBackend, RemoteBackend, RestCacheManager};
use karavan_state::{Backend, PropertiesTemplate};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub remote_url: Option<String>,
}

/// Read `path` (or start from defaults) and apply CLI overrides.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<KaravanConfig> {
    let mut config = match path {
        Some(path) => KaravanConfig::from_file(path)?,
        None => KaravanConfig::default(),
    };

    if let Some(dir) = &overrides.data_dir {
        config.store.data_dir = dir.clone();
    }
    if let Some(url) = &overrides.remote_url {
        match config.remote.as_mut() {
            Some(remote) => remote.url = url.clone(),
            None => config.remote = Some(RemoteSection::new(url.clone())),
        }
    }

    config.validate()?;
    Ok(config)
}

/// Remote when a `[remote]` section is present, embedded otherwise.
pub fn build_backend(config: &KaravanConfig) -> anyhow::Result<Backend> {
    match &config.remote {
        Some(remote) => {
            let manager = RestCacheManager::new(
                &remote.url,
                remote.username.as_deref(),
                remote.password.as_deref(),
                remote.timeout(),
            )
            .with_context(|| format!("remote cache manager at {}", remote.url))?;
            info!(url = %remote.url, "using remote cache cluster");
            Ok(Backend::Remote(RemoteBackend::new(Arc::new(manager))))
        }
        None => {
            let path = config.store_path();
            let backend = EmbeddedBackend::open(&path)
                .with_context(|| format!("opening embedded store {}", path.display()))?;
            info!(path = %path.display(), "using embedded store");
            Ok(Backend::Embedded(backend))
        }
    }
}

pub fn load_template(config: &KaravanConfig) -> anyhow::Result<PropertiesTemplate> {
    match &config.project.properties_template {
        Some(path) => Ok(PropertiesTemplate::from_file(path)?),
        None => Ok(PropertiesTemplate::default()),
    }
}

pub fn build_controller(config: &KaravanConfig) -> anyhow::Result<LifecycleController> {
    Ok(LifecycleController::new(build_backend(config)?).with_template(load_template(config)?))
}

#[cfg(test)]
mod tests {
    use karavan_health::{HealthReport, LifecycleState};
    use karavan_state::Mode;

    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let config = load_config(None, &Overrides::default()).unwrap();
        assert!(config.remote.is_none());
        assert_eq!(config.store.data_dir, PathBuf::from("karavan-data"));
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("karavan.toml");
        std::fs::write(
            &path,
            "[store]\ndata_dir = \"/srv/karavan\"\n\n[remote]\nurl = \"http://old:11222\"\nusername = \"admin\"\n",
        )
        .unwrap();

        let overrides = Overrides {
            data_dir: Some(PathBuf::from("/tmp/other")),
            remote_url: Some("http://new:11222".to_string()),
        };
        let config = load_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/other"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.url, "http://new:11222");
        assert_eq!(remote.username.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn remote_url_override_selects_remote_backend() {
        let overrides = Overrides {
            remote_url: Some("http://127.0.0.1:11222".to_string()),
            ..Default::default()
        };
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(build_backend(&config).unwrap().mode(), Mode::Remote);
    }

    #[test]
    fn unsupported_remote_url_is_rejected() {
        let overrides = Overrides {
            remote_url: Some("ftp://cache".to_string()),
            ..Default::default()
        };
        let config = load_config(None, &overrides).unwrap();
        assert!(build_backend(&config).is_err());
    }

    #[test]
    fn missing_template_file_fails() {
        let mut config = KaravanConfig::default();
        config.project.properties_template = Some(PathBuf::from("/nonexistent/app.tmpl"));
        assert!(load_template(&config).is_err());
    }

    #[tokio::test]
    async fn embedded_controller_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("app.tmpl");
        std::fs::write(&template, "project={projectId}\n").unwrap();

        let mut config = KaravanConfig::default();
        config.store.data_dir = dir.path().join("data");
        config.project.properties_template = Some(template);

        let controller = build_controller(&config).unwrap();
        assert_eq!(controller.mode(), Mode::Embedded);
        let store = controller.start().await.unwrap();
        assert_eq!(controller.state(), LifecycleState::Ready);
        assert_eq!(
            controller.health().await,
            HealthReport::Up("embedded mode running".to_string())
        );
        assert!(config.store_path().exists());

        store
            .save_project(&karavan_state::Project::new("demo", "Demo", "", "quarkus"), false)
            .await
            .unwrap();
        let file = store
            .get_project_file("demo", "application.properties")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(file.code, "project=demo\n");
    }
}
