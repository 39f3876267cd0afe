//! Cleanup reporting and label-based orphan sweeps

use strum::IntoEnumIterator;
use tracing::{info, warn};

use super::handle::LifecyclePhase;
use crate::chaos::{ChaosKind, ChaosStore, DeleteOutcome, ExperimentId};
use crate::error::{ChaosError, ChaosResult};

/// Outcome of removing one experiment during cleanup
#[derive(Debug)]
pub struct CleanupOutcome {
    pub id: ExperimentId,
    /// `Gone` when removal was confirmed
    pub phase: LifecyclePhase,
    /// `None` when removal was confirmed
    pub error: Option<ChaosError>,
}

/// Per-experiment results of [`ChaosSession::cleanup_all`](super::ChaosSession::cleanup_all)
#[derive(Debug, Default)]
pub struct CleanupReport {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupReport {
    pub(crate) fn record(
        &mut self,
        id: ExperimentId,
        phase: LifecyclePhase,
        error: Option<ChaosError>,
    ) {
        self.outcomes.push(CleanupOutcome { id, phase, error });
    }

    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// True when every experiment was confirmed gone
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }

    /// Experiments that may still exist on the cluster
    pub fn failures(&self) -> impl Iterator<Item = (&ExperimentId, &ChaosError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| (&o.id, e)))
    }

    pub fn removed(&self) -> impl Iterator<Item = &ExperimentId> {
        self.outcomes
            .iter()
            .filter(|o| o.error.is_none())
            .map(|o| &o.id)
    }

    /// Opt-in strictness: turn any failure into `ChaosError::CleanupFailed`
    pub fn into_result(self) -> ChaosResult<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(ChaosError::CleanupFailed(self))
        }
    }
}

/// Delete every experiment of every known kind in `namespace` matching
/// `label_selector`. Returns how many were (or, with `dry_run`, would be)
/// deleted. Failures for one kind are logged and do not stop the sweep.
pub async fn sweep_orphans(
    store: &dyn ChaosStore,
    namespace: &str,
    label_selector: &str,
    dry_run: bool,
) -> usize {
    let mut cleaned = 0;

    for kind in ChaosKind::iter() {
        let ids = match store.list_by_label(kind, namespace, label_selector).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Error listing {} experiments: {}", kind, e);
                continue;
            }
        };

        for id in ids {
            if dry_run {
                info!("[dry-run] Would delete {}", id);
                cleaned += 1;
                continue;
            }

            info!("Deleting orphaned experiment {}", id);
            match store.delete(&id).await {
                Ok(DeleteOutcome::Deleted) => cleaned += 1,
                Ok(DeleteOutcome::NotFound) => {}
                Err(e) => warn!("Failed to delete {}: {}", id, e),
            }
        }
    }

    cleaned
}
