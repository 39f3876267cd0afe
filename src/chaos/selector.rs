//! Pod selectors for chaos experiments
//!
//! A selector targets pods either by labels within a set of namespaces, or by
//! explicit pod names per namespace. The two modes are mutually exclusive and
//! enforced at construction.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ChaosError, ChaosResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    namespaces: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    label_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pods: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    field_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotation_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    node_selectors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pod_phase_selectors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    expression_selectors: Vec<Value>,
}

impl Selector {
    fn empty() -> Self {
        Self {
            namespaces: Vec::new(),
            label_selectors: BTreeMap::new(),
            pods: BTreeMap::new(),
            field_selectors: BTreeMap::new(),
            annotation_selectors: BTreeMap::new(),
            node_selectors: BTreeMap::new(),
            pod_phase_selectors: Vec::new(),
            expression_selectors: Vec::new(),
        }
    }

    /// Target pods matching all `labels` in any of `namespaces`
    pub fn from_labels<K, V, N>(
        labels: impl IntoIterator<Item = (K, V)>,
        namespaces: impl IntoIterator<Item = N>,
    ) -> ChaosResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
        N: Into<String>,
    {
        let label_selectors: BTreeMap<String, String> = labels
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let namespaces: Vec<String> = namespaces.into_iter().map(Into::into).collect();

        if label_selectors.is_empty() {
            return Err(ChaosError::AmbiguousSelector(
                "label selector needs at least one label".to_string(),
            ));
        }
        if namespaces.is_empty() {
            return Err(ChaosError::AmbiguousSelector(
                "label selector needs at least one namespace".to_string(),
            ));
        }
        if namespaces.iter().any(|ns| ns.is_empty()) {
            return Err(ChaosError::validation("namespace names must not be empty"));
        }

        Ok(Self {
            namespaces,
            label_selectors,
            ..Self::empty()
        })
    }

    /// Target exactly the named pods in `namespace`
    pub fn from_pods<P: Into<String>>(
        namespace: &str,
        pod_names: impl IntoIterator<Item = P>,
    ) -> ChaosResult<Self> {
        let names: Vec<String> = pod_names.into_iter().map(Into::into).collect();

        if namespace.is_empty() {
            return Err(ChaosError::validation("pod selector needs a namespace"));
        }
        if names.is_empty() {
            return Err(ChaosError::AmbiguousSelector(
                "pod selector needs at least one pod name".to_string(),
            ));
        }

        let mut pods = BTreeMap::new();
        pods.insert(namespace.to_string(), names);

        Ok(Self {
            namespaces: vec![namespace.to_string()],
            pods,
            ..Self::empty()
        })
    }

    /// Add explicit pods from another namespace to a pod-name selector
    pub fn and_pods<P: Into<String>>(
        mut self,
        namespace: &str,
        pod_names: impl IntoIterator<Item = P>,
    ) -> ChaosResult<Self> {
        if self.is_label_based() {
            return Err(ChaosError::AmbiguousSelector(
                "cannot combine label selectors with explicit pods".to_string(),
            ));
        }
        let names: Vec<String> = pod_names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ChaosError::AmbiguousSelector(
                "pod selector needs at least one pod name".to_string(),
            ));
        }
        if !self.namespaces.iter().any(|ns| ns == namespace) {
            self.namespaces.push(namespace.to_string());
        }
        self.pods
            .entry(namespace.to_string())
            .or_default()
            .extend(names);
        Ok(self)
    }

    pub fn with_field_selector(mut self, key: &str, value: &str) -> Self {
        self.field_selectors
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_annotation_selector(mut self, key: &str, value: &str) -> Self {
        self.annotation_selectors
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_node_selector(mut self, key: &str, value: &str) -> Self {
        self.node_selectors
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Only affect pods in these phases (e.g. `Running`)
    pub fn with_pod_phases<P: Into<String>>(mut self, phases: impl IntoIterator<Item = P>) -> Self {
        self.pod_phase_selectors
            .extend(phases.into_iter().map(Into::into));
        self
    }

    /// Attach a raw label expression (`{"key": .., "operator": .., "values": [..]}`)
    pub fn with_expression(mut self, expression: Value) -> Self {
        self.expression_selectors.push(expression);
        self
    }

    pub fn is_label_based(&self) -> bool {
        !self.label_selectors.is_empty()
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.label_selectors
    }

    pub fn pods(&self) -> &BTreeMap<String, Vec<String>> {
        &self.pods
    }

    /// Render as the `selector` object of a Chaos Mesh spec
    pub fn to_crd_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.pods.is_empty() {
            let pods: Vec<String> = self
                .pods
                .iter()
                .map(|(ns, names)| format!("{}/{}", ns, names.join(",")))
                .collect();
            write!(f, "pods: {}", pods.join(", "))
        } else {
            let labels: Vec<String> = self
                .label_selectors
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(
                f,
                "labels: {} in {}",
                labels.join(", "),
                self.namespaces.join(", ")
            )
        }
    }
}
