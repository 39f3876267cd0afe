//! Experiment handles tracked by a session

use crate::chaos::{ChaosExperiment, ExperimentId, ExperimentPhase};

/// Where an experiment is in its lifecycle, from the session's point of view.
///
/// A handle only exists once creation is confirmed, so the in-flight create
/// inside `inject` has no phase of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LifecyclePhase {
    Created,
    Ready,
    /// Readiness was not observed in time; still owned and still cleaned up
    TimedOutWaiting,
    Deleting,
    /// Absence confirmed; no longer tracked
    Gone,
    /// Deletion was not confirmed; the resource may be orphaned
    TimedOutDeleting,
}

/// A submitted experiment
#[derive(Debug, Clone)]
pub struct ExperimentHandle {
    experiment: ChaosExperiment,
    remote_uid: String,
    phase: LifecyclePhase,
    observed: Option<ExperimentPhase>,
}

impl ExperimentHandle {
    pub(crate) fn created(experiment: ChaosExperiment, remote_uid: String) -> Self {
        Self {
            experiment,
            remote_uid,
            phase: LifecyclePhase::Created,
            observed: None,
        }
    }

    pub fn id(&self) -> &ExperimentId {
        self.experiment.id()
    }

    pub fn experiment(&self) -> &ChaosExperiment {
        &self.experiment
    }

    pub fn remote_uid(&self) -> &str {
        &self.remote_uid
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    /// Last phase reported by Chaos Mesh, if it was ever polled
    pub fn observed_phase(&self) -> Option<&ExperimentPhase> {
        self.observed.as_ref()
    }

    pub(crate) fn set_phase(&mut self, phase: LifecyclePhase) {
        self.phase = phase;
    }

    pub(crate) fn observe(&mut self, phase: ExperimentPhase) {
        self.observed = Some(phase);
    }
}
