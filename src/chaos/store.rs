//! The remote side of an experiment, as the lifecycle controller sees it

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::experiment::ChaosExperiment;
use super::types::{ChaosKind, ExperimentId, ExperimentStatus};
use crate::error::ChaosResult;

/// Result of a raw delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Create/get/delete/list against the Chaos Mesh control plane.
///
/// Implementations never retry; transient failures come back as
/// `ChaosError::Connection` and the caller decides what to do.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChaosStore: Send + Sync {
    /// Submit the experiment. Returns the remote uid.
    ///
    /// Fails with `AlreadyExists` on a name collision and `Validation` when the
    /// control plane rejects the object.
    async fn create(&self, experiment: &ChaosExperiment) -> ChaosResult<String>;

    /// Current status, or `None` when the object does not exist
    async fn get_status(&self, id: &ExperimentId) -> ChaosResult<Option<ExperimentStatus>>;

    async fn delete(&self, id: &ExperimentId) -> ChaosResult<DeleteOutcome>;

    /// Identities of all experiments of `kind` in `namespace` matching `label_selector`
    async fn list_by_label(
        &self,
        kind: ChaosKind,
        namespace: &str,
        label_selector: &str,
    ) -> ChaosResult<Vec<ExperimentId>>;
}
