//! Error types for chaos experiment orchestration

use std::time::Duration;

use thiserror::Error;

use crate::chaos::ExperimentId;
use crate::session::CleanupReport;

/// Result alias used across the crate
pub type ChaosResult<T> = Result<T, ChaosError>;

/// Everything that can go wrong while injecting or retracting chaos
#[derive(Debug, Error)]
pub enum ChaosError {
    /// The Kubernetes API could not be reached, or answered with a transient failure
    #[error("connection to Chaos Mesh failed: {0}")]
    Connection(String),

    /// An experiment with the same identity already exists (HTTP 409)
    #[error("{0} already exists")]
    AlreadyExists(ExperimentId),

    /// The experiment does not exist on the remote side (HTTP 404)
    #[error("{0} not found")]
    NotFound(ExperimentId),

    /// Fault parameters or the remote schema rejected the experiment
    #[error("validation failed: {0}")]
    Validation(String),

    /// Selector targets both labels and explicit pods, or nothing at all
    #[error("ambiguous selector: {0}")]
    AmbiguousSelector(String),

    /// Readiness or absence was not observed before the deadline
    #[error("timed out after {elapsed:?} waiting for {id} to be {waiting_for}")]
    Timeout {
        id: ExperimentId,
        waiting_for: &'static str,
        elapsed: Duration,
    },

    /// Chaos Mesh reported the experiment as failed while waiting for injection
    #[error("{id} reported failure: {reason}")]
    ExperimentFailed { id: ExperimentId, reason: String },

    /// Scope exit left experiments behind and the caller asked to fail on that
    #[error("cleanup left {} experiment(s) possibly orphaned", .0.failures().count())]
    CleanupFailed(CleanupReport),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ChaosError {
    pub fn connection(msg: &str) -> Self {
        Self::Connection(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Whether retrying the same request can reasonably succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}
