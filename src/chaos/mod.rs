//! Chaos Mesh resource model and remote store
//!
//! Describes experiments as typed values and talks to the cluster:
//! - Pod chaos (kill, failure, container kill)
//! - Network chaos (delay, loss, duplicate, corrupt, reorder, bandwidth, partition)
//! - Selectors by label or by explicit pod names

mod client;
mod experiment;
mod faults;
mod selector;
mod store;
mod types;

pub use client::KubeChaosStore;
pub use experiment::{ChaosExperiment, ExperimentBuilder, MANAGED_BY_LABEL, MANAGED_BY_VALUE};
pub use faults::{
    BandwidthSpec, DelaySpec, Fault, NetworkAction, NetworkFault, PacketRate, PodAction, PodFault,
    ReorderSpec,
};
pub use selector::Selector;
#[cfg(test)]
pub use store::MockChaosStore;
pub use store::{ChaosStore, DeleteOutcome};
pub use types::*;
