pub mod config;
pub mod duration;

pub use config::{HealthSection, KaravanConfig, ProjectSection, RemoteSection, StoreSection};
pub use duration::parse_duration;
