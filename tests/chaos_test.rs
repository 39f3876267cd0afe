//! Tests for the experiment model
//!
//! These tests verify experiment construction, validation, and the manifests
//! sent to Chaos Mesh.

use serde_json::json;

use chaos_lifecycle::chaos::*;
use chaos_lifecycle::ChaosError;

fn web_selector() -> Selector {
    Selector::from_labels([("app", "web")], ["apps"]).unwrap()
}

#[test]
fn test_chaos_kind_display_and_plural() {
    assert_eq!(ChaosKind::PodChaos.to_string(), "PodChaos");
    assert_eq!(ChaosKind::NetworkChaos.plural(), "networkchaos");
    assert_eq!(ChaosKind::IOChaos.plural(), "iochaos");
    assert_eq!("NetworkChaos".parse::<ChaosKind>().unwrap(), ChaosKind::NetworkChaos);
    assert!("WeatherChaos".parse::<ChaosKind>().is_err());
}

#[test]
fn test_chaos_direction_display() {
    assert_eq!(Direction::To.to_string(), "to");
    assert_eq!(Direction::From.to_string(), "from");
    assert_eq!(Direction::Both.to_string(), "both");
}

#[test]
fn test_pod_kill_manifest() {
    let exp = ChaosExperiment::builder(PodFault::kill().with_grace_period(0), web_selector())
        .name("kill-web")
        .namespace("chaos-testing")
        .mode(Mode::Fixed(2))
        .build()
        .unwrap();

    let manifest = exp.to_manifest("chaos-mesh.org", "v1alpha1");
    assert_eq!(manifest["apiVersion"], "chaos-mesh.org/v1alpha1");
    assert_eq!(manifest["kind"], "PodChaos");
    assert_eq!(manifest["metadata"]["name"], "kill-web");
    assert_eq!(manifest["metadata"]["namespace"], "chaos-testing");
    assert_eq!(
        manifest["metadata"]["labels"][MANAGED_BY_LABEL],
        MANAGED_BY_VALUE
    );

    let spec = &manifest["spec"];
    assert_eq!(spec["action"], "pod-kill");
    assert_eq!(spec["mode"], "fixed");
    assert_eq!(spec["value"], "2");
    assert_eq!(spec["gracePeriod"], 0);
    assert_eq!(spec["selector"]["namespaces"], json!(["apps"]));
    assert_eq!(spec["selector"]["labelSelectors"], json!({ "app": "web" }));
    assert!(spec.get("duration").is_none());
}

#[test]
fn test_pod_failure_carries_its_duration() {
    let exp = ChaosExperiment::builder(PodFault::failure("45s").unwrap(), web_selector())
        .build()
        .unwrap();

    assert_eq!(exp.duration(), Some("45s"));
    assert_eq!(exp.spec()["duration"], "45s");
    assert_eq!(exp.spec()["action"], "pod-failure");
}

#[test]
fn test_network_delay_spec() {
    let fault = NetworkFault::delay(
        DelaySpec::new("100ms")
            .unwrap()
            .with_jitter("10ms")
            .unwrap()
            .with_correlation("25")
            .unwrap(),
    )
    .with_direction(Direction::Both);

    let exp = ChaosExperiment::builder(fault, web_selector())
        .mode(Mode::All)
        .duration("2m")
        .build()
        .unwrap();

    let spec = exp.spec();
    assert_eq!(exp.kind(), ChaosKind::NetworkChaos);
    assert_eq!(spec["action"], "delay");
    assert_eq!(spec["mode"], "all");
    assert!(spec.get("value").is_none());
    assert_eq!(spec["duration"], "2m");
    assert_eq!(spec["direction"], "both");
    assert_eq!(
        spec["delay"],
        json!({ "latency": "100ms", "jitter": "10ms", "correlation": "25" })
    );
}

#[test]
fn test_network_loss_spec() {
    let fault = NetworkFault::loss(PacketRate::new("25").unwrap().with_correlation("50").unwrap());
    let exp = ChaosExperiment::builder(fault, web_selector())
        .mode(Mode::FixedPercent(50))
        .build()
        .unwrap();

    let spec = exp.spec();
    assert_eq!(spec["loss"], json!({ "loss": "25", "correlation": "50" }));
    assert_eq!(spec["mode"], "fixed-percent");
    assert_eq!(spec["value"], "50");
}

#[test]
fn test_bandwidth_spec() {
    let fault = NetworkFault::bandwidth(BandwidthSpec::new("1mbps", 20000, 10000).unwrap());
    let spec = ChaosExperiment::builder(fault, web_selector())
        .build()
        .unwrap()
        .spec();

    assert_eq!(spec["bandwidth"]["rate"], "1mbps");
    assert_eq!(spec["bandwidth"]["limit"], 20000);
    assert_eq!(spec["bandwidth"]["buffer"], 10000);
    assert!(spec["bandwidth"].get("peakrate").is_none());
}

#[test]
fn test_partition_targets_second_selector() {
    let target = Selector::from_pods("apps", ["db-0"]).unwrap();
    let fault = NetworkFault::partition(target, Direction::Both);
    let spec = ChaosExperiment::builder(fault, web_selector())
        .build()
        .unwrap()
        .spec();

    assert_eq!(spec["action"], "partition");
    assert_eq!(spec["target"]["mode"], "all");
    assert_eq!(spec["target"]["selector"]["pods"], json!({ "apps": ["db-0"] }));
    assert_eq!(spec["direction"], "both");
}

#[test]
fn test_external_targets_and_device() {
    let fault = NetworkFault::loss_percent("10")
        .unwrap()
        .with_device("eth0")
        .with_external_targets(["example.com", "10.0.0.0/8"]);
    let spec = ChaosExperiment::builder(fault, web_selector())
        .build()
        .unwrap()
        .spec();

    assert_eq!(spec["device"], "eth0");
    assert_eq!(spec["externalTargets"], json!(["example.com", "10.0.0.0/8"]));
}

#[test]
fn test_invalid_magnitudes_rejected() {
    assert!(matches!(
        DelaySpec::new("100").unwrap_err(),
        ChaosError::Validation(_)
    ));
    assert!(DelaySpec::new("fast").is_err());
    assert!(PacketRate::new("150").is_err());
    assert!(PacketRate::new("-1").is_err());
    assert!(BandwidthSpec::new("1 mbps", 1, 1).is_err());
    assert!(BandwidthSpec::new("1mbps", 0, 1).is_err());
    assert!(ReorderSpec::new("10", 0).is_err());
    assert!(PodFault::failure("soon").is_err());
}

#[test]
fn test_invalid_mode_rejected() {
    let err = ChaosExperiment::builder(PodFault::kill(), web_selector())
        .mode(Mode::FixedPercent(120))
        .build()
        .unwrap_err();
    assert!(matches!(err, ChaosError::Validation(_)));

    assert!(ChaosExperiment::builder(PodFault::kill(), web_selector())
        .mode(Mode::Fixed(0))
        .build()
        .is_err());
}

#[test]
fn test_invalid_name_rejected() {
    let err = ChaosExperiment::builder(PodFault::kill(), web_selector())
        .name("Kill_Web")
        .build()
        .unwrap_err();
    assert!(matches!(err, ChaosError::Validation(_)));
}

#[test]
fn test_invalid_namespace_rejected() {
    for namespace in ["chaos.testing".to_string(), "n".repeat(64)] {
        let err = ChaosExperiment::builder(PodFault::kill(), web_selector())
            .namespace(namespace.as_str())
            .build()
            .unwrap_err();
        assert!(matches!(err, ChaosError::Validation(_)), "{}", namespace);
    }
}

#[test]
fn test_padded_percentages_rejected() {
    assert!(PacketRate::new(" 25").is_err());
    assert!(PacketRate::new("25 ").is_err());
    assert!(NetworkFault::loss_percent(" 10").is_err());
    assert!(PacketRate::new("25").unwrap().with_correlation(" 50").is_err());
}

#[test]
fn test_selector_cannot_mix_labels_and_pods() {
    let err = web_selector().and_pods("apps", ["web-0"]).unwrap_err();
    assert!(matches!(err, ChaosError::AmbiguousSelector(_)));

    let pods = Selector::from_pods("apps", ["web-0"])
        .unwrap()
        .and_pods("cache", ["redis-0", "redis-1"])
        .unwrap();
    assert_eq!(pods.namespaces(), ["apps".to_string(), "cache".to_string()]);
    assert_eq!(pods.to_string(), "pods: apps/web-0, cache/redis-0,redis-1");
}

#[test]
fn test_yaml_rendering() {
    let exp = ChaosExperiment::builder(PodFault::kill(), web_selector())
        .name("kill-web")
        .build()
        .unwrap();

    let yaml = exp.to_yaml("chaos-mesh.org", "v1alpha1").unwrap();
    assert!(yaml.contains("kind: PodChaos"));
    assert!(yaml.contains("name: kill-web"));
    assert!(yaml.contains("action: pod-kill"));
}

#[test]
fn test_status_readiness_by_kind() {
    let running = ExperimentStatus::with_phase(ExperimentPhase::Running);
    let injected = ExperimentStatus::with_phase(ExperimentPhase::Injected);

    assert!(running.is_ready_for(ChaosKind::PodChaos));
    assert!(!running.is_ready_for(ChaosKind::NetworkChaos));
    assert!(injected.is_ready_for(ChaosKind::NetworkChaos));
}
