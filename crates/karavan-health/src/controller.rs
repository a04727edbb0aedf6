//! Lifecycle controller: provisions the store and answers the health check.
//!
//! State machine:
//!
//! ```text
//! NOT_STARTED ──start──► STARTING ──ok──► READY
//!                           │
//!                           └──err──► DEGRADED ──start──► STARTING ...
//! ```
//!
//! Only [`LifecycleController::start`] moves the state, and only one start
//! can be in flight. Observers read it through [`LifecycleController::state`]
//! or a [`watch::Receiver`].

use std::fmt;
use std::sync::OnceLock;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use karavan_state::{Backend, Mode, PropertiesTemplate, StateError, StatusStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Ready,
    /// Start-up failed; a later `start` may retry.
    Degraded,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::NotStarted => "NOT_STARTED",
            LifecycleState::Starting => "STARTING",
            LifecycleState::Ready => "READY",
            LifecycleState::Degraded => "DEGRADED",
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot start from state {0}")]
    IllegalTransition(LifecycleState),

    #[error("remote cache manager is not started")]
    ClusterNotStarted,

    #[error("cache provisioning failed: {0}")]
    Provisioning(#[source] StateError),

    #[error("volatile cache reset failed: {0}")]
    Reset(#[source] StateError),
}

/// Result of the readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthReport {
    Up(String),
    Down(String),
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthReport::Up(_))
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthReport::Up(detail) => write!(f, "UP ({detail})"),
            HealthReport::Down(detail) => write!(f, "DOWN ({detail})"),
        }
    }
}

pub struct LifecycleController {
    backend: Backend,
    template: PropertiesTemplate,
    state_tx: watch::Sender<LifecycleState>,
    store: OnceLock<StatusStore>,
}

impl LifecycleController {
    pub fn new(backend: Backend) -> Self {
        let (state_tx, _) = watch::channel(LifecycleState::NotStarted);
        Self {
            backend,
            template: PropertiesTemplate::default(),
            state_tx,
            store: OnceLock::new(),
        }
    }

    pub fn with_template(mut self, template: PropertiesTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// The store, once the controller is READY.
    pub fn store(&self) -> Option<StatusStore> {
        self.store.get().cloned()
    }

    /// Provision every cache and move to READY.
    ///
    /// Embedded mode also clears the volatile caches so no stale status
    /// survives a restart. Any failure leaves the controller DEGRADED.
    pub async fn start(&self) -> Result<StatusStore, LifecycleError> {
        let mut from = LifecycleState::NotStarted;
        let claimed = self.state_tx.send_if_modified(|state| {
            from = *state;
            if matches!(state, LifecycleState::NotStarted | LifecycleState::Degraded) {
                *state = LifecycleState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(LifecycleError::IllegalTransition(from));
        }

        let mode = self.mode();
        info!(%mode, "status store starting");

        match self.provision().await {
            Ok(store) => {
                let store = self.store.get_or_init(|| store).clone();
                self.state_tx.send_replace(LifecycleState::Ready);
                info!(%mode, "status store ready");
                Ok(store)
            }
            Err(e) => {
                self.state_tx.send_replace(LifecycleState::Degraded);
                error!(%mode, error = %e, "status store start failed");
                Err(e)
            }
        }
    }

    async fn provision(&self) -> Result<StatusStore, LifecycleError> {
        if let Backend::Remote(remote) = &self.backend {
            if !remote.manager().is_started().await {
                return Err(LifecycleError::ClusterNotStarted);
            }
        }

        let store = StatusStore::provision(&self.backend)
            .await
            .map_err(LifecycleError::Provisioning)?
            .with_template(self.template.clone());

        if self.mode() == Mode::Embedded {
            store.reset_volatile().await.map_err(LifecycleError::Reset)?;
        }
        Ok(store)
    }

    /// UP when READY and, in remote mode, the cache manager reports started.
    pub async fn health(&self) -> HealthReport {
        if self.state() != LifecycleState::Ready {
            return HealthReport::Down("not running".to_string());
        }
        match &self.backend {
            Backend::Embedded(_) => HealthReport::Up("embedded mode running".to_string()),
            Backend::Remote(remote) => {
                if remote.manager().is_started().await {
                    HealthReport::Up("remote mode running".to_string())
                } else {
                    HealthReport::Down("not running".to_string())
                }
            }
        }
    }
}
