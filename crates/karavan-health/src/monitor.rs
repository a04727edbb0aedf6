//! Readiness monitor: background task that polls the controller.
//!
//! The monitor calls [`LifecycleController::health`] every interval, folds
//! the results through a [`ReadinessTracker`] and publishes the readiness
//! on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::checker::{Readiness, ReadinessTracker};
use crate::controller::LifecycleController;

struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct ReadinessMonitor {
    controller: Arc<LifecycleController>,
    interval: Duration,
    unhealthy_threshold: u32,
    readiness_tx: watch::Sender<Readiness>,
    slot: Mutex<Option<MonitorSlot>>,
}

impl ReadinessMonitor {
    pub fn new(
        controller: Arc<LifecycleController>,
        interval: Duration,
        unhealthy_threshold: u32,
    ) -> Self {
        let (readiness_tx, _) = watch::channel(Readiness::Unknown);
        Self {
            controller,
            interval,
            unhealthy_threshold,
            readiness_tx,
            slot: Mutex::new(None),
        }
    }

    /// Start probing. A running monitor is replaced.
    pub async fn start(&self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = Arc::clone(&self.controller);
        let readiness_tx = self.readiness_tx.clone();
        let interval = self.interval;
        let threshold = self.unhealthy_threshold;

        let handle = tokio::spawn(async move {
            run_readiness_loop(controller, interval, threshold, readiness_tx, shutdown_rx).await;
        });

        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.replace(MonitorSlot {
            handle,
            shutdown_tx,
        }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(interval = ?self.interval, threshold, "readiness monitor started");
    }

    pub async fn stop(&self) {
        if let Some(slot) = self.slot.lock().await.take() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!("readiness monitor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    pub fn readiness(&self) -> Readiness {
        *self.readiness_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.readiness_tx.subscribe()
    }
}

async fn run_readiness_loop(
    controller: Arc<LifecycleController>,
    interval: Duration,
    threshold: u32,
    readiness_tx: watch::Sender<Readiness>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tracker = ReadinessTracker::new(threshold);
    debug!(state = %controller.state(), "readiness loop starting");

    loop {
        let report = controller.health().await;
        let readiness = tracker.record(&report);
        readiness_tx.send_if_modified(|current| {
            if *current != readiness {
                *current = readiness;
                true
            } else {
                false
            }
        });

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                debug!("readiness loop shutting down");
                break;
            }
        }
    }
}
