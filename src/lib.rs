//! Chaos Lifecycle Library
//!
//! Injects Chaos Mesh experiments into a Kubernetes cluster, waits for them to
//! take effect and guarantees they are removed again, even when the code that
//! injected them fails.

pub mod backoff;
pub mod chaos;
pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod util;

pub use chaos::{
    ChaosExperiment, ChaosKind, ChaosStore, DeleteOutcome, Direction, ExperimentId,
    ExperimentPhase, ExperimentStatus, KubeChaosStore, Mode, NetworkFault, PodFault, Selector,
};
pub use config::{ChaosConfig, ConfigUpdate};
pub use error::{ChaosError, ChaosResult};
pub use session::{
    sweep_orphans, ChaosSession, CleanupOutcome, CleanupReport, ExperimentHandle, LifecyclePhase,
};
