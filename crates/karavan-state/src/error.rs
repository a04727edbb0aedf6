//! Error types for the Karavan status store.

use std::fmt;

use thiserror::Error;

/// Result type alias for status store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during status store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed query, unknown entity type, or the index is unavailable.
    #[error("query error: {0}")]
    Query(String),

    /// The remote cache server could not be reached or answered unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provisioning of cache '{cache}' failed: {reason}")]
    Provisioning { cache: String, reason: String },

    /// A dependent lookup found its prerequisite missing or malformed.
    #[error("inconsistent state: {0}")]
    Inconsistent(String),

    #[error("{} cache(s) failed: {}", failed.len(), CacheFailure::join(failed))]
    PartialFailure { failed: Vec<CacheFailure> },
}

/// One failed cache inside a multi-cache operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFailure {
    pub cache: String,
    pub reason: String,
}

impl CacheFailure {
    fn join(failures: &[CacheFailure]) -> String {
        failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for CacheFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.cache, self.reason)
    }
}

impl StateError {
    /// Names of the caches that failed, for a `PartialFailure`; empty otherwise.
    pub fn failed_caches(&self) -> Vec<&str> {
        match self {
            StateError::PartialFailure { failed } => {
                failed.iter().map(|f| f.cache.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_lists_caches() {
        let err = StateError::PartialFailure {
            failed: vec![
                CacheFailure {
                    cache: "pod_statuses".to_string(),
                    reason: "timeout".to_string(),
                },
                CacheFailure {
                    cache: "camel_statuses".to_string(),
                    reason: "refused".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "2 cache(s) failed: pod_statuses (timeout), camel_statuses (refused)"
        );
        assert_eq!(err.failed_caches(), vec!["pod_statuses", "camel_statuses"]);
    }

    #[test]
    fn failed_caches_empty_for_other_errors() {
        assert!(StateError::NotFound("x".into()).failed_caches().is_empty());
    }
}
