//! Chaos Mesh kinds, identities and observed status

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::{ChaosError, ChaosResult};

/// Kind of Chaos Mesh CRD
#[allow(clippy::upper_case_acronyms)]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum ChaosKind {
    PodChaos,
    NetworkChaos,
    IOChaos,
    StressChaos,
    TimeChaos,
    KernelChaos,
    DNSChaos,
    HTTPChaos,
    JVMChaos,
    AWSChaos,
    GCPChaos,
}

impl ChaosKind {
    /// Resource plural used in API paths (`networkchaos`, `podchaos`, ...)
    pub fn plural(&self) -> String {
        self.as_ref().to_lowercase()
    }

    /// Phase that means the fault is actively applied
    pub fn ready_phase(&self) -> ExperimentPhase {
        match self {
            ChaosKind::PodChaos => ExperimentPhase::Running,
            _ => ExperimentPhase::Injected,
        }
    }
}

/// Identity of one experiment on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperimentId {
    pub kind: ChaosKind,
    pub namespace: String,
    pub name: String,
}

impl ExperimentId {
    pub fn new(kind: ChaosKind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// How many of the selected pods are affected
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Mode {
    /// A single random pod
    #[default]
    One,
    /// Every selected pod
    All,
    /// Exactly this many pods
    Fixed(u32),
    /// This percentage of the selected pods
    FixedPercent(u8),
    /// A random percentage up to this value
    RandomMaxPercent(u8),
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::One => "one",
            Mode::All => "all",
            Mode::Fixed(_) => "fixed",
            Mode::FixedPercent(_) => "fixed-percent",
            Mode::RandomMaxPercent(_) => "random-max-percent",
        }
    }

    /// The `spec.value` field, present only for modes that need one
    pub fn value(&self) -> Option<String> {
        match self {
            Mode::One | Mode::All => None,
            Mode::Fixed(n) => Some(n.to_string()),
            Mode::FixedPercent(p) | Mode::RandomMaxPercent(p) => Some(p.to_string()),
        }
    }

    pub fn validate(&self) -> ChaosResult<()> {
        match self {
            Mode::Fixed(0) => Err(ChaosError::validation(
                "mode 'fixed' requires a positive pod count",
            )),
            Mode::FixedPercent(p) | Mode::RandomMaxPercent(p) if *p > 100 => {
                Err(ChaosError::Validation(format!(
                    "mode '{}' requires a percentage between 0 and 100, got {}",
                    self.as_str(),
                    p
                )))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value() {
            Some(value) => write!(f, "{}({})", self.as_str(), value),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

/// Traffic direction for network chaos
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply to outgoing traffic
    #[default]
    To,
    /// Apply to incoming traffic
    From,
    /// Apply to both directions
    Both,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::To => write!(f, "to"),
            Direction::From => write!(f, "from"),
            Direction::Both => write!(f, "both"),
        }
    }
}

/// Phase of an experiment as reported by Chaos Mesh
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ExperimentPhase {
    Pending,
    Running,
    Injected,
    Paused,
    Finished,
    Failed,
    Unknown,
}

/// One entry of `status.conditions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusCondition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

/// Observed remote status of an experiment
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentStatus {
    pub phase: ExperimentPhase,
    pub conditions: Vec<StatusCondition>,
}

impl ExperimentStatus {
    pub fn with_phase(phase: ExperimentPhase) -> Self {
        Self {
            phase,
            conditions: Vec::new(),
        }
    }

    pub fn condition_true(&self, type_: &str) -> bool {
        self.conditions
            .iter()
            .any(|c| c.type_ == type_ && c.is_true())
    }

    /// Readiness predicate for the given kind
    pub fn is_ready_for(&self, kind: ChaosKind) -> bool {
        self.phase == kind.ready_phase() || self.condition_true("AllInjected")
    }

    /// First condition message, used to explain failures
    pub fn message(&self) -> Option<&str> {
        self.conditions.iter().find_map(|c| c.message.as_deref())
    }
}
