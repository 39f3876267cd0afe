//! Shared fixtures for integration tests
//!
//! `FakeStore` is an in-memory Chaos Mesh stand-in whose status answers and
//! failures are scripted per test.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use chaos_lifecycle::chaos::{
    ChaosExperiment, ChaosKind, ChaosStore, DeleteOutcome, ExperimentId, ExperimentPhase,
    ExperimentStatus, NetworkFault, PodFault, Selector,
};
use chaos_lifecycle::{ChaosConfig, ChaosError, ChaosResult};

/// Failure to inject into the next call of an operation
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Unavailable,
    Conflict,
    Rejected,
}

impl Failure {
    fn to_error(self, id: &ExperimentId) -> ChaosError {
        match self {
            Failure::Unavailable => ChaosError::connection("503 service unavailable"),
            Failure::Conflict => ChaosError::AlreadyExists(id.clone()),
            Failure::Rejected => ChaosError::validation("admission webhook denied the request"),
        }
    }
}

struct Object {
    labels: BTreeMap<String, String>,
    /// Status polls left before the object disappears, once deletion started
    deleting: Option<usize>,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ExperimentId, Object>,
    scripts: HashMap<String, VecDeque<ExperimentPhase>>,
    never_delete: HashSet<String>,
    create_failures: VecDeque<Failure>,
    delete_failures: VecDeque<Failure>,
    status_failures: VecDeque<Failure>,
    linger_polls: usize,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
    creates: AtomicUsize,
    deletes: AtomicUsize,
    polls: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Phases reported for experiment `name`, one per poll; the last one repeats.
    /// Unscripted experiments report their kind's ready phase.
    pub fn script(&self, name: &str, phases: &[ExperimentPhase]) {
        self.state()
            .scripts
            .insert(name.to_string(), phases.iter().cloned().collect());
    }

    /// Deletion of `name` is accepted but the object never goes away
    pub fn never_delete(&self, name: &str) {
        self.state().never_delete.insert(name.to_string());
    }

    /// Deleted objects stay visible for this many status polls
    pub fn linger_after_delete(&self, polls: usize) {
        self.state().linger_polls = polls;
    }

    pub fn fail_next_create(&self, failure: Failure) {
        self.state().create_failures.push_back(failure);
    }

    pub fn fail_next_delete(&self, failure: Failure) {
        self.state().delete_failures.push_back(failure);
    }

    pub fn fail_next_status(&self, failure: Failure) {
        self.state().status_failures.push_back(failure);
    }

    /// Put an object on the "cluster" without going through a session
    pub fn insert(&self, id: ExperimentId, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state().objects.insert(
            id.clone(),
            Object {
                labels,
                deleting: None,
            },
        );
    }

    /// Remove an object behind the session's back
    pub fn forget(&self, id: &ExperimentId) {
        self.state().objects.remove(id);
    }

    pub fn exists(&self, id: &ExperimentId) -> bool {
        self.state().objects.contains_key(id)
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl ChaosStore for FakeStore {
    async fn create(&self, experiment: &ChaosExperiment) -> ChaosResult<String> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let id = experiment.id();
        let mut state = self.state();

        if let Some(failure) = state.create_failures.pop_front() {
            return Err(failure.to_error(id));
        }
        if state.objects.contains_key(id) {
            return Err(ChaosError::AlreadyExists(id.clone()));
        }

        let uid = format!("uid-{}", n);
        state.objects.insert(
            id.clone(),
            Object {
                labels: experiment.labels().clone(),
                deleting: None,
            },
        );
        Ok(uid)
    }

    async fn get_status(&self, id: &ExperimentId) -> ChaosResult<Option<ExperimentStatus>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();

        if let Some(failure) = state.status_failures.pop_front() {
            return Err(failure.to_error(id));
        }

        let deleting = match state.objects.get_mut(id) {
            None => return Ok(None),
            Some(object) => object.deleting.as_mut().map(|left| {
                let gone = *left == 0;
                *left = left.saturating_sub(1);
                gone
            }),
        };
        match deleting {
            Some(true) => {
                state.objects.remove(id);
                return Ok(None);
            }
            Some(false) => return Ok(Some(ExperimentStatus::with_phase(ExperimentPhase::Pending))),
            None => {}
        }

        let phase = match state.scripts.get_mut(&id.name) {
            Some(script) if script.len() > 1 => script.pop_front(),
            Some(script) => script.front().cloned(),
            None => None,
        }
        .unwrap_or_else(|| id.kind.ready_phase());

        Ok(Some(ExperimentStatus::with_phase(phase)))
    }

    async fn delete(&self, id: &ExperimentId) -> ChaosResult<DeleteOutcome> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();

        if let Some(failure) = state.delete_failures.pop_front() {
            return Err(failure.to_error(id));
        }

        let linger = if state.never_delete.contains(&id.name) {
            usize::MAX
        } else {
            state.linger_polls
        };
        match state.objects.get_mut(id) {
            None => Ok(DeleteOutcome::NotFound),
            Some(object) => {
                if object.deleting.is_none() {
                    object.deleting = Some(linger);
                }
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    async fn list_by_label(
        &self,
        kind: ChaosKind,
        namespace: &str,
        label_selector: &str,
    ) -> ChaosResult<Vec<ExperimentId>> {
        Ok(self
            .state()
            .objects
            .iter()
            .filter(|(id, object)| {
                id.kind == kind
                    && id.namespace == namespace
                    && matches_selector(&object.labels, label_selector)
            })
            .map(|(id, _)| id.clone())
            .collect())
    }
}

/// Short waits so paused-clock tests stay readable
pub fn test_config() -> ChaosConfig {
    ChaosConfig {
        retry_min_wait: 0.1,
        retry_max_wait: 1.0,
        poll_interval: 0.5,
        wait_timeout: 5.0,
        delete_timeout: 2.0,
        ..Default::default()
    }
}

pub fn web_selector() -> Selector {
    Selector::from_labels([("app", "web")], ["apps"]).unwrap()
}

pub fn pod_kill(name: &str) -> ChaosExperiment {
    ChaosExperiment::builder(PodFault::kill(), web_selector())
        .name(name)
        .namespace("chaos-testing")
        .build()
        .unwrap()
}

pub fn network_delay(name: &str) -> ChaosExperiment {
    ChaosExperiment::builder(NetworkFault::latency("100ms", "10ms").unwrap(), web_selector())
        .name(name)
        .namespace("chaos-testing")
        .duration("30s")
        .build()
        .unwrap()
}
