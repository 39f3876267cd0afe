//! Experiment lifecycle tracking
//!
//! A [`ChaosSession`] owns every experiment it injects until removal is
//! confirmed, and guarantees a cleanup attempt for each of them when a
//! [`ChaosSession::scope`] ends.

mod controller;
mod handle;
mod report;

pub use controller::ChaosSession;
pub use handle::{ExperimentHandle, LifecyclePhase};
pub use report::{sweep_orphans, CleanupOutcome, CleanupReport};
