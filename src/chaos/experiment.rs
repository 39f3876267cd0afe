//! The experiment descriptor: one fully-validated Chaos Mesh resource
//!
//! `ChaosExperiment` is immutable once built. Its identity is
//! `(kind, namespace, name)`; the name is generated unless supplied.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::debug;

use super::faults::Fault;
use super::selector::Selector;
use super::types::{ChaosKind, ExperimentId, Mode};
use crate::error::{ChaosError, ChaosResult};
use crate::util::{generate_unique_name, parse_duration};

/// Label put on every experiment this crate creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "chaos-lifecycle";

const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct ChaosExperiment {
    id: ExperimentId,
    selector: Selector,
    mode: Mode,
    duration: Option<String>,
    labels: BTreeMap<String, String>,
    fault: Arc<Fault>,
}

impl ChaosExperiment {
    pub fn builder(fault: impl Into<Fault>, selector: Selector) -> ExperimentBuilder {
        ExperimentBuilder {
            fault: fault.into(),
            selector,
            name: None,
            namespace: None,
            mode: Mode::default(),
            duration: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn kind(&self) -> ChaosKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn namespace(&self) -> &str {
        &self.id.namespace
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn duration(&self) -> Option<&str> {
        self.duration.as_deref()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn fault(&self) -> &Fault {
        &self.fault
    }

    /// Build the `spec` object
    pub fn spec(&self) -> Value {
        let mut spec = Map::new();
        spec.insert("selector".to_string(), self.selector.to_crd_value());
        spec.insert("mode".to_string(), json!(self.mode.as_str()));
        if let Some(value) = self.mode.value() {
            spec.insert("value".to_string(), json!(value));
        }
        if let Some(duration) = &self.duration {
            spec.insert("duration".to_string(), json!(duration));
        }
        spec.extend(self.fault.spec_fields());
        Value::Object(spec)
    }

    /// Build the full custom resource for `{api_group}/{api_version}`
    pub fn to_manifest(&self, api_group: &str, api_version: &str) -> Value {
        debug!(experiment = %self.id, "Rendering manifest");
        json!({
            "apiVersion": format!("{}/{}", api_group, api_version),
            "kind": self.kind().to_string(),
            "metadata": {
                "name": self.name(),
                "namespace": self.namespace(),
                "labels": self.labels,
            },
            "spec": self.spec()
        })
    }

    /// Manifest as YAML, handy for `kubectl apply -f -` when debugging
    pub fn to_yaml(&self, api_group: &str, api_version: &str) -> ChaosResult<String> {
        serde_yaml::to_string(&self.to_manifest(api_group, api_version))
            .map_err(|e| ChaosError::Validation(format!("failed to render YAML: {}", e)))
    }
}

impl std::fmt::Display for ChaosExperiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(name={}, action={}, {}, mode={})",
            self.kind(),
            self.name(),
            self.fault.action_name(),
            self.selector,
            self.mode
        )
    }
}

/// Builder for [`ChaosExperiment`]; all checks run in [`ExperimentBuilder::build`]
#[derive(Debug)]
pub struct ExperimentBuilder {
    fault: Fault,
    selector: Selector,
    name: Option<String>,
    namespace: Option<String>,
    mode: Mode,
    duration: Option<String>,
    labels: BTreeMap<String, String>,
}

impl ExperimentBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Namespace the experiment object lives in (not the targets' namespace)
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// How long the fault stays applied, e.g. `60s`
    pub fn duration(mut self, duration: &str) -> Self {
        self.duration = Some(duration.to_string());
        self
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> ChaosResult<ChaosExperiment> {
        self.mode.validate()?;

        let duration = self
            .duration
            .or_else(|| self.fault.default_duration().map(str::to_string));
        if let Some(d) = &duration {
            parse_duration(d)?;
        }

        let kind = self.fault.kind();
        let name = match self.name {
            Some(name) => {
                validate_resource_name(&name)?;
                name
            }
            None => {
                let generated = generate_unique_name(&kind.plural());
                debug!(name = %generated, "Generated experiment name");
                generated
            }
        };
        let namespace = self
            .namespace
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        validate_namespace(&namespace)?;

        let mut labels = self.labels;
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        Ok(ChaosExperiment {
            id: ExperimentId::new(kind, &namespace, &name),
            selector: self.selector,
            mode: self.mode,
            duration,
            labels,
            fault: Arc::new(self.fault),
        })
    }
}

/// RFC 1123 subdomain check, as enforced by the API server
fn validate_resource_name(name: &str) -> ChaosResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    if name.len() > 253 || !valid_chars || !valid_edges {
        return Err(ChaosError::Validation(format!(
            "'{}' is not a valid Kubernetes resource name",
            name
        )));
    }
    Ok(())
}

/// Namespaces are RFC 1123 labels: at most 63 characters and no dots
fn validate_namespace(namespace: &str) -> ChaosResult<()> {
    if namespace.len() > 63 || namespace.contains('.') {
        return Err(ChaosError::Validation(format!(
            "'{}' is not a valid Kubernetes namespace",
            namespace
        )));
    }
    validate_resource_name(namespace)
}
