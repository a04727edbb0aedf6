//! Readiness check bookkeeping.
//!
//! Folds a stream of UP/DOWN health results into a readiness status with a
//! failure threshold, so a single slow check does not flap the status.

use tracing::{debug, warn};

use crate::controller::HealthReport;

/// Readiness as seen by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// No check has completed yet.
    Unknown,
    Ready,
    NotReady,
}

/// Tracks consecutive health results for the status store.
#[derive(Debug)]
pub struct ReadinessTracker {
    status: Readiness,
    consecutive_failures: u32,
    /// DOWN checks in a row before reporting `NotReady`.
    unhealthy_threshold: u32,
}

impl ReadinessTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self {
            status: Readiness::Unknown,
            consecutive_failures: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
        }
    }

    /// Record a health result and return the new readiness.
    pub fn record(&mut self, report: &HealthReport) -> Readiness {
        match report {
            HealthReport::Up(detail) => {
                self.consecutive_failures = 0;
                if self.status != Readiness::Ready {
                    debug!(%detail, "status store ready");
                }
                self.status = Readiness::Ready;
            }
            HealthReport::Down(detail) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != Readiness::NotReady {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            %detail,
                            "status store not ready"
                        );
                    }
                    self.status = Readiness::NotReady;
                }
            }
        }

        self.status
    }

    pub fn status(&self) -> Readiness {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
