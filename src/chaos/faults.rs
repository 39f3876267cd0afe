//! Fault parameters for PodChaos and NetworkChaos
//!
//! Every constructor validates its inputs, so a `Fault` that exists is one the
//! Chaos Mesh webhook should accept. Rendering produces the action-specific
//! part of the CRD `spec`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::selector::Selector;
use super::types::{ChaosKind, Direction};
use crate::error::{ChaosError, ChaosResult};
use crate::util::{parse_duration, validate_network_duration, validate_percentage};

/// The PodChaos action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PodAction {
    PodKill,
    PodFailure,
    ContainerKill,
}

impl PodAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodAction::PodKill => "pod-kill",
            PodAction::PodFailure => "pod-failure",
            PodAction::ContainerKill => "container-kill",
        }
    }
}

/// Parameters of a PodChaos experiment
#[derive(Debug, Clone, PartialEq)]
pub struct PodFault {
    action: PodAction,
    grace_period: Option<u32>,
    duration: Option<String>,
    container_names: Vec<String>,
}

impl PodFault {
    /// Kill the selected pods
    pub fn kill() -> Self {
        Self {
            action: PodAction::PodKill,
            grace_period: None,
            duration: None,
            container_names: Vec::new(),
        }
    }

    /// Make the selected pods unavailable for `duration` (e.g. `30s`)
    pub fn failure(duration: &str) -> ChaosResult<Self> {
        parse_duration(duration)?;
        Ok(Self {
            action: PodAction::PodFailure,
            duration: Some(duration.to_string()),
            ..Self::kill()
        })
    }

    /// Kill the named containers inside the selected pods
    pub fn container_kill<N: Into<String>>(
        container_names: impl IntoIterator<Item = N>,
    ) -> ChaosResult<Self> {
        let container_names: Vec<String> = container_names.into_iter().map(Into::into).collect();
        if container_names.is_empty() || container_names.iter().any(|c| c.is_empty()) {
            return Err(ChaosError::validation(
                "container-kill requires at least one container name",
            ));
        }
        Ok(Self {
            action: PodAction::ContainerKill,
            container_names,
            ..Self::kill()
        })
    }

    /// Seconds the kubelet waits before force-killing
    pub fn with_grace_period(mut self, seconds: u32) -> Self {
        self.grace_period = Some(seconds);
        self
    }

    pub fn action(&self) -> PodAction {
        self.action
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    fn spec_fields(&self) -> Map<String, Value> {
        let mut spec = Map::new();
        spec.insert("action".to_string(), json!(self.action.as_str()));
        if !self.container_names.is_empty() {
            spec.insert("containerNames".to_string(), json!(self.container_names));
        }
        if let Some(grace) = self.grace_period {
            spec.insert("gracePeriod".to_string(), json!(grace));
        }
        spec
    }
}

/// Latency parameters for `delay`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelaySpec {
    latency: String,
    jitter: String,
    correlation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reorder: Option<ReorderSpec>,
}

impl DelaySpec {
    pub fn new(latency: &str) -> ChaosResult<Self> {
        validate_network_duration(latency, "latency")?;
        Ok(Self {
            latency: latency.to_string(),
            jitter: "0ms".to_string(),
            correlation: "0".to_string(),
            reorder: None,
        })
    }

    pub fn with_jitter(mut self, jitter: &str) -> ChaosResult<Self> {
        validate_network_duration(jitter, "jitter")?;
        self.jitter = jitter.to_string();
        Ok(self)
    }

    pub fn with_correlation(mut self, correlation: &str) -> ChaosResult<Self> {
        validate_percentage(correlation, "correlation")?;
        self.correlation = correlation.to_string();
        Ok(self)
    }

    pub fn with_reorder(mut self, reorder: ReorderSpec) -> Self {
        self.reorder = Some(reorder);
        self
    }
}

/// A percentage with optional correlation, shared by loss, duplicate and corrupt
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRate {
    percent: String,
    correlation: String,
}

impl PacketRate {
    pub fn new(percent: &str) -> ChaosResult<Self> {
        validate_percentage(percent, "percentage")?;
        Ok(Self {
            percent: percent.to_string(),
            correlation: "0".to_string(),
        })
    }

    pub fn with_correlation(mut self, correlation: &str) -> ChaosResult<Self> {
        validate_percentage(correlation, "correlation")?;
        self.correlation = correlation.to_string();
        Ok(self)
    }

    fn render(&self, field: &str) -> Value {
        let mut rendered = Map::new();
        rendered.insert(field.to_string(), json!(self.percent));
        rendered.insert("correlation".to_string(), json!(self.correlation));
        Value::Object(rendered)
    }
}

/// Packet reordering parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReorderSpec {
    reorder: String,
    correlation: String,
    gap: u32,
}

impl ReorderSpec {
    pub fn new(reorder: &str, gap: u32) -> ChaosResult<Self> {
        validate_percentage(reorder, "reorder")?;
        if gap == 0 {
            return Err(ChaosError::validation("reorder gap must be positive"));
        }
        Ok(Self {
            reorder: reorder.to_string(),
            correlation: "0".to_string(),
            gap,
        })
    }

    pub fn with_correlation(mut self, correlation: &str) -> ChaosResult<Self> {
        validate_percentage(correlation, "correlation")?;
        self.correlation = correlation.to_string();
        Ok(self)
    }
}

/// Token bucket parameters for `bandwidth`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandwidthSpec {
    rate: String,
    limit: u32,
    buffer: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    peakrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minburst: Option<u32>,
}

impl BandwidthSpec {
    /// `rate` like `1mbps`; `limit` and `buffer` in bytes
    pub fn new(rate: &str, limit: u32, buffer: u32) -> ChaosResult<Self> {
        let digits = rate.chars().take_while(|c| c.is_ascii_digit()).count();
        let unit = &rate[digits..];
        if digits == 0 || !matches!(unit, "bps" | "kbps" | "mbps" | "gbps" | "tbps") {
            return Err(ChaosError::Validation(format!(
                "invalid bandwidth rate '{}': expected e.g. '1mbps' or '100kbps'",
                rate
            )));
        }
        if limit == 0 || buffer == 0 {
            return Err(ChaosError::validation(
                "bandwidth limit and buffer must be positive",
            ));
        }
        Ok(Self {
            rate: rate.to_string(),
            limit,
            buffer,
            peakrate: None,
            minburst: None,
        })
    }

    pub fn with_peak(mut self, peakrate: u64, minburst: u32) -> Self {
        self.peakrate = Some(peakrate);
        self.minburst = Some(minburst);
        self
    }
}

/// The NetworkChaos action together with its magnitude
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkAction {
    Delay(DelaySpec),
    Loss(PacketRate),
    Duplicate(PacketRate),
    Corrupt(PacketRate),
    Partition { target: Selector },
    Bandwidth(BandwidthSpec),
    Reorder(ReorderSpec),
}

impl NetworkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkAction::Delay(_) => "delay",
            NetworkAction::Loss(_) => "loss",
            NetworkAction::Duplicate(_) => "duplicate",
            NetworkAction::Corrupt(_) => "corrupt",
            NetworkAction::Partition { .. } => "partition",
            NetworkAction::Bandwidth(_) => "bandwidth",
            NetworkAction::Reorder(_) => "reorder",
        }
    }
}

/// Parameters of a NetworkChaos experiment
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFault {
    action: NetworkAction,
    direction: Option<Direction>,
    device: Option<String>,
    external_targets: Vec<String>,
}

impl NetworkFault {
    fn with_action(action: NetworkAction) -> Self {
        Self {
            action,
            direction: None,
            device: None,
            external_targets: Vec::new(),
        }
    }

    pub fn delay(spec: DelaySpec) -> Self {
        Self::with_action(NetworkAction::Delay(spec))
    }

    /// Shorthand for a delay with jitter
    pub fn latency(latency: &str, jitter: &str) -> ChaosResult<Self> {
        Ok(Self::delay(DelaySpec::new(latency)?.with_jitter(jitter)?))
    }

    pub fn loss(rate: PacketRate) -> Self {
        Self::with_action(NetworkAction::Loss(rate))
    }

    /// Shorthand for packet loss without correlation
    pub fn loss_percent(percent: &str) -> ChaosResult<Self> {
        Ok(Self::loss(PacketRate::new(percent)?))
    }

    pub fn duplicate(rate: PacketRate) -> Self {
        Self::with_action(NetworkAction::Duplicate(rate))
    }

    pub fn corrupt(rate: PacketRate) -> Self {
        Self::with_action(NetworkAction::Corrupt(rate))
    }

    pub fn reorder(spec: ReorderSpec) -> Self {
        Self::with_action(NetworkAction::Reorder(spec))
    }

    pub fn bandwidth(spec: BandwidthSpec) -> Self {
        Self::with_action(NetworkAction::Bandwidth(spec))
    }

    /// Cut traffic between the experiment selector and `target`
    pub fn partition(target: Selector, direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            ..Self::with_action(NetworkAction::Partition { target })
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }

    /// IPs or hostnames outside the cluster affected by the fault
    pub fn with_external_targets<T: Into<String>>(
        mut self,
        targets: impl IntoIterator<Item = T>,
    ) -> Self {
        self.external_targets
            .extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn action(&self) -> &NetworkAction {
        &self.action
    }

    fn spec_fields(&self) -> Map<String, Value> {
        let mut spec = Map::new();
        spec.insert("action".to_string(), json!(self.action.as_str()));

        match &self.action {
            NetworkAction::Delay(delay) => {
                spec.insert("delay".to_string(), json!(delay));
            }
            NetworkAction::Loss(rate) => {
                spec.insert("loss".to_string(), rate.render("loss"));
            }
            NetworkAction::Duplicate(rate) => {
                spec.insert("duplicate".to_string(), rate.render("duplicate"));
            }
            NetworkAction::Corrupt(rate) => {
                spec.insert("corrupt".to_string(), rate.render("corrupt"));
            }
            NetworkAction::Partition { target } => {
                // Chaos Mesh expects target.selector plus its own mode
                spec.insert(
                    "target".to_string(),
                    json!({ "selector": target.to_crd_value(), "mode": "all" }),
                );
            }
            NetworkAction::Bandwidth(bw) => {
                spec.insert("bandwidth".to_string(), json!(bw));
            }
            NetworkAction::Reorder(reorder) => {
                spec.insert("reorder".to_string(), json!(reorder));
            }
        }

        if let Some(direction) = self.direction {
            spec.insert("direction".to_string(), json!(direction.to_string()));
        }
        if let Some(device) = &self.device {
            spec.insert("device".to_string(), json!(device));
        }
        if !self.external_targets.is_empty() {
            spec.insert("externalTargets".to_string(), json!(self.external_targets));
        }
        spec
    }
}

/// Fault parameters, one variant per supported CRD kind
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    Pod(PodFault),
    Network(NetworkFault),
}

impl Fault {
    pub fn kind(&self) -> ChaosKind {
        match self {
            Fault::Pod(_) => ChaosKind::PodChaos,
            Fault::Network(_) => ChaosKind::NetworkChaos,
        }
    }

    /// Duration implied by the fault itself (pod-failure carries one)
    pub fn default_duration(&self) -> Option<&str> {
        match self {
            Fault::Pod(pod) => pod.duration(),
            Fault::Network(_) => None,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Fault::Pod(pod) => pod.action.as_str(),
            Fault::Network(net) => net.action.as_str(),
        }
    }

    /// Action-specific spec fields, merged into the experiment spec
    pub fn spec_fields(&self) -> Map<String, Value> {
        match self {
            Fault::Pod(pod) => pod.spec_fields(),
            Fault::Network(net) => net.spec_fields(),
        }
    }
}

impl From<PodFault> for Fault {
    fn from(fault: PodFault) -> Self {
        Fault::Pod(fault)
    }
}

impl From<NetworkFault> for Fault {
    fn from(fault: NetworkFault) -> Self {
        Fault::Network(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_kill_requires_names() {
        assert!(PodFault::container_kill(Vec::<String>::new()).is_err());

        let fault = PodFault::container_kill(["nginx", "sidecar"])
            .unwrap()
            .with_grace_period(5);
        let spec = fault.spec_fields();
        assert_eq!(spec["action"], "container-kill");
        assert_eq!(spec["containerNames"], json!(["nginx", "sidecar"]));
        assert_eq!(spec["gracePeriod"], 5);
    }

    #[test]
    fn test_pod_failure_validates_duration() {
        assert!(PodFault::failure("30x").is_err());
        let fault = PodFault::failure("30s").unwrap();
        assert_eq!(Fault::from(fault).default_duration(), Some("30s"));
    }

    #[test]
    fn test_create_delay_fault() {
        let fault = NetworkFault::delay(
            DelaySpec::new("200ms")
                .unwrap()
                .with_jitter("50ms")
                .unwrap()
                .with_correlation("25")
                .unwrap(),
        )
        .with_direction(Direction::Both);

        let spec = fault.spec_fields();
        assert_eq!(spec["action"], "delay");
        assert_eq!(spec["delay"]["latency"], "200ms");
        assert_eq!(spec["delay"]["jitter"], "50ms");
        assert_eq!(spec["delay"]["correlation"], "25");
        assert!(spec["delay"].get("reorder").is_none());
        assert_eq!(spec["direction"], "both");
    }

    #[test]
    fn test_invalid_magnitudes_rejected() {
        assert!(DelaySpec::new("100").is_err());
        assert!(DelaySpec::new("100ms").unwrap().with_jitter("lots").is_err());
        assert!(PacketRate::new("150").is_err());
        assert!(BandwidthSpec::new("fast", 1000, 10000).is_err());
        assert!(BandwidthSpec::new("1mbps", 0, 10000).is_err());
        assert!(ReorderSpec::new("10", 0).is_err());
    }

    #[test]
    fn test_create_loss_fault() {
        let fault = NetworkFault::loss(PacketRate::new("25").unwrap().with_correlation("50").unwrap());
        let spec = fault.spec_fields();

        assert_eq!(spec["action"], "loss");
        assert_eq!(spec["loss"], json!({"loss": "25", "correlation": "50"}));
        assert!(spec.get("direction").is_none());
    }

    #[test]
    fn test_create_partition_fault() {
        let target = Selector::from_labels([("app", "db")], ["apps"]).unwrap();
        let fault = NetworkFault::partition(target, Direction::Both);
        let spec = fault.spec_fields();

        assert_eq!(spec["action"], "partition");
        assert_eq!(spec["direction"], "both");
        assert_eq!(spec["target"]["mode"], "all");
        assert_eq!(spec["target"]["selector"]["labelSelectors"]["app"], "db");
    }

    #[test]
    fn test_create_bandwidth_fault() {
        let fault = NetworkFault::bandwidth(
            BandwidthSpec::new("1mbps", 1000, 10000)
                .unwrap()
                .with_peak(2_000_000, 1500),
        )
        .with_device("eth0")
        .with_external_targets(["example.com"]);
        let spec = fault.spec_fields();

        assert_eq!(spec["bandwidth"]["rate"], "1mbps");
        assert_eq!(spec["bandwidth"]["limit"], 1000);
        assert_eq!(spec["bandwidth"]["buffer"], 10000);
        assert_eq!(spec["bandwidth"]["peakrate"], 2_000_000);
        assert_eq!(spec["device"], "eth0");
        assert_eq!(spec["externalTargets"], json!(["example.com"]));
    }
}
