//! Chaos Mesh Kubernetes client
//!
//! Creates, inspects, lists and deletes Chaos Mesh custom resources through
//! `Api<DynamicObject>`, so any CRD kind works without generated types.

use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
    discovery::ApiResource,
    Client, Config,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::experiment::ChaosExperiment;
use super::store::{ChaosStore, DeleteOutcome};
use super::types::*;
use crate::config::ChaosConfig;
use crate::error::{ChaosError, ChaosResult};

/// `ChaosStore` backed by a live Kubernetes API server
#[derive(Clone)]
pub struct KubeChaosStore {
    client: Client,
    api_group: String,
    api_version: String,
}

impl KubeChaosStore {
    /// Connect using `config.kubeconfig_path`, or in-cluster / default kubeconfig inference
    pub async fn new(config: &ChaosConfig) -> ChaosResult<Self> {
        let kube_config = match &config.kubeconfig_path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    ChaosError::Connection(format!("Failed to read kubeconfig {}: {}", path, e))
                })?;
                let cfg = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| {
                        ChaosError::Connection(format!("Invalid kubeconfig {}: {}", path, e))
                    })?;
                info!(path = %path, "Loaded kubeconfig");
                cfg
            }
            None => Config::infer().await.map_err(|e| {
                ChaosError::Connection(format!(
                    "Failed to load Kubernetes configuration: {}. \
                     Run inside a cluster or provide a valid kubeconfig",
                    e
                ))
            })?,
        };

        let client = Client::try_from(kube_config)
            .map_err(|e| ChaosError::Connection(format!("Failed to create K8s client: {}", e)))?;

        info!(
            "Chaos store initialized for {}/{}",
            config.api_group, config.api_version
        );
        Ok(Self::from_client(client, config))
    }

    /// Wrap an existing client
    pub fn from_client(client: Client, config: &ChaosConfig) -> Self {
        Self {
            client,
            api_group: config.api_group.clone(),
            api_version: config.api_version.clone(),
        }
    }

    fn api_resource(&self, kind: ChaosKind) -> ApiResource {
        ApiResource {
            group: self.api_group.clone(),
            version: self.api_version.clone(),
            api_version: format!("{}/{}", self.api_group, self.api_version),
            kind: kind.to_string(),
            plural: kind.plural(),
        }
    }

    fn api(&self, kind: ChaosKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.api_resource(kind))
    }
}

#[async_trait]
impl ChaosStore for KubeChaosStore {
    #[instrument(skip(self, experiment), fields(experiment = %experiment.id()))]
    async fn create(&self, experiment: &ChaosExperiment) -> ChaosResult<String> {
        let id = experiment.id();
        let manifest = experiment.to_manifest(&self.api_group, &self.api_version);
        let obj: DynamicObject = serde_json::from_value(manifest)?;

        match self
            .api(id.kind, &id.namespace)
            .create(&PostParams::default(), &obj)
            .await
        {
            Ok(created) => {
                info!("Created {}", id);
                Ok(created
                    .metadata
                    .uid
                    .unwrap_or_else(|| id.name.clone()))
            }
            Err(e) => {
                let err = classify(e, id, "create");
                error!("Failed to create {}: {}", id, err);
                Err(err)
            }
        }
    }

    #[instrument(skip(self), fields(experiment = %id))]
    async fn get_status(&self, id: &ExperimentId) -> ChaosResult<Option<ExperimentStatus>> {
        match self.api(id.kind, &id.namespace).get_opt(&id.name).await {
            Ok(Some(obj)) => {
                let status = parse_status(id.kind, &obj.data);
                debug!(phase = %status.phase, "Fetched status");
                Ok(Some(status))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(classify(e, id, "get")),
        }
    }

    #[instrument(skip(self), fields(experiment = %id))]
    async fn delete(&self, id: &ExperimentId) -> ChaosResult<DeleteOutcome> {
        match self
            .api(id.kind, &id.namespace)
            .delete(&id.name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!("Deleted {}", id);
                Ok(DeleteOutcome::Deleted)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!("{} not found (already deleted?)", id);
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => {
                let err = classify(e, id, "delete");
                error!("Failed to delete {}: {}", id, err);
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_by_label(
        &self,
        kind: ChaosKind,
        namespace: &str,
        label_selector: &str,
    ) -> ChaosResult<Vec<ExperimentId>> {
        let lp = if label_selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(label_selector)
        };

        match self.api(kind, namespace).list(&lp).await {
            Ok(list) => {
                let ids: Vec<ExperimentId> = list
                    .items
                    .into_iter()
                    .filter_map(|obj| obj.metadata.name)
                    .map(|name| ExperimentId::new(kind, namespace, &name))
                    .collect();
                debug!("Listed {} {} resources in {}", ids.len(), kind, namespace);
                Ok(ids)
            }
            Err(e) => Err(ChaosError::Connection(format!(
                "Failed to list {} in {}: {}",
                kind, namespace, e
            ))),
        }
    }
}

/// Map a kube error onto the crate's taxonomy by HTTP status
fn classify(err: kube::Error, id: &ExperimentId, operation: &str) -> ChaosError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => ChaosError::AlreadyExists(id.clone()),
        kube::Error::Api(ae) if ae.code == 404 => ChaosError::NotFound(id.clone()),
        kube::Error::Api(ae) if ae.code == 400 || ae.code == 422 => ChaosError::Validation(
            format!("{} of {} rejected: {}", operation, id, ae.message),
        ),
        e => ChaosError::Connection(format!("Failed to {} {}: {}", operation, id, e)),
    }
}

/// Derive an `ExperimentStatus` from the object's `status` block
fn parse_status(kind: ChaosKind, data: &Value) -> ExperimentStatus {
    let status = data.get("status").cloned().unwrap_or(Value::Null);

    let conditions: Vec<StatusCondition> = status
        .get("conditions")
        .cloned()
        .and_then(|c| serde_json::from_value(c).ok())
        .unwrap_or_default();

    let desired_phase = status
        .get("experiment")
        .and_then(|e| e.get("desiredPhase"))
        .and_then(|p| p.as_str());

    let is_true = |type_: &str| conditions.iter().any(|c| c.type_ == type_ && c.is_true());

    let phase = if is_true("Failed") || is_true("Timeout") {
        ExperimentPhase::Failed
    } else if is_true("AllInjected") {
        kind.ready_phase()
    } else if is_true("Paused") {
        ExperimentPhase::Paused
    } else if desired_phase == Some("Stop") || is_true("AllRecovered") {
        ExperimentPhase::Finished
    } else if status.is_null() || desired_phase == Some("Run") || !conditions.is_empty() {
        ExperimentPhase::Pending
    } else {
        ExperimentPhase::Unknown
    };

    ExperimentStatus { phase, conditions }
}
