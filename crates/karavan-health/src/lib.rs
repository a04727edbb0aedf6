//! karavan-health: lifecycle and readiness for the Karavan status store.
//!
//! # Architecture
//!
//! ```text
//! LifecycleController
//!   ├── start(): NOT_STARTED → STARTING → READY | DEGRADED
//!   │   ├── embedded: provision caches, reset volatile caches
//!   │   └── remote:   require started cluster, provision caches
//!   └── health() → UP("<mode> mode running") | DOWN("not running")
//!
//! ReadinessMonitor
//!   └── background task: health() every interval → ReadinessTracker
//! ```
//!
//! The tracker only reports `NotReady` after `unhealthy_threshold` DOWN
//! checks in a row. A single UP restores `Ready`.

pub mod checker;
pub mod controller;
pub mod monitor;

pub use checker::{Readiness, ReadinessTracker};
pub use controller::{HealthReport, LifecycleController, LifecycleError, LifecycleState};
pub use monitor::ReadinessMonitor;
