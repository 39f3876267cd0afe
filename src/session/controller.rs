//! The experiment lifecycle controller
//!
//! A `ChaosSession` creates experiments, waits for Chaos Mesh to report them
//! injected, deletes them and waits for them to disappear. Every experiment is
//! tracked from the moment its creation is confirmed until its absence is, so
//! `cleanup_all` (run automatically by [`ChaosSession::scope`]) can always find it.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::handle::{ExperimentHandle, LifecyclePhase};
use super::report::CleanupReport;
use crate::backoff::Backoff;
use crate::chaos::{
    ChaosExperiment, ChaosStore, DeleteOutcome, ExperimentId, ExperimentPhase, ExperimentStatus,
};
use crate::config::{self, ChaosConfig};
use crate::error::{ChaosError, ChaosResult};

/// What one status observation means for a wait loop
enum PollStep {
    Done,
    Pending,
    Abort(ChaosError),
}

pub struct ChaosSession {
    store: Arc<dyn ChaosStore>,
    config: ChaosConfig,
    tracked: BTreeMap<ExperimentId, ExperimentHandle>,
    rng: StdRng,
}

impl ChaosSession {
    /// Create a session. Does no I/O.
    pub fn new(store: Arc<dyn ChaosStore>, config: ChaosConfig) -> Self {
        Self {
            store,
            config,
            tracked: BTreeMap::new(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Create a session using a snapshot of the process-wide configuration
    pub fn with_global_config(store: Arc<dyn ChaosStore>) -> Self {
        Self::new(store, ChaosConfig::clone(&config::global()))
    }

    /// Seed the jitter source, making backoff sleeps reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    pub fn is_tracked(&self, id: &ExperimentId) -> bool {
        self.tracked.contains_key(id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = &ExperimentHandle> {
        self.tracked.values()
    }

    pub fn handle(&self, id: &ExperimentId) -> Option<&ExperimentHandle> {
        self.tracked.get(id)
    }

    /// Submit `experiment` and optionally wait until Chaos Mesh reports it applied.
    ///
    /// The experiment is tracked as soon as creation succeeds, so a timeout or
    /// failure while waiting still leaves it subject to cleanup. `timeout`
    /// defaults to `wait_timeout`.
    pub async fn inject(
        &mut self,
        experiment: ChaosExperiment,
        wait: bool,
        timeout: Option<Duration>,
    ) -> ChaosResult<ExperimentHandle> {
        let id = experiment.id().clone();
        if self.tracked.contains_key(&id) {
            return Err(ChaosError::AlreadyExists(id));
        }

        info!("Injecting {}", experiment);

        let store = Arc::clone(&self.store);
        let backoff = self.config.retry_backoff();
        let uid = retry_transient(
            &backoff,
            self.config.retry_max_attempts,
            &mut self.rng,
            "create",
            &id,
            || store.create(&experiment),
        )
        .await
        .map_err(|e| {
            error!("Failed to inject {}: {}", id, e);
            e
        })?;

        self.tracked
            .insert(id.clone(), ExperimentHandle::created(experiment, uid));

        if !wait {
            return self.snapshot(&id);
        }

        let timeout = timeout.unwrap_or_else(|| self.config.wait_timeout());
        let kind = id.kind;
        let waited = self
            .poll_until(&id, timeout, "injected", |observed| match observed {
                Ok(Some(status)) if status.is_ready_for(kind) => PollStep::Done,
                Ok(Some(status)) if status.phase == ExperimentPhase::Failed => {
                    PollStep::Abort(ChaosError::ExperimentFailed {
                        id: id.clone(),
                        reason: status
                            .message()
                            .unwrap_or("experiment reported failure")
                            .to_string(),
                    })
                }
                Ok(Some(status)) if status.phase == ExperimentPhase::Finished => {
                    PollStep::Abort(ChaosError::ExperimentFailed {
                        id: id.clone(),
                        reason: "experiment finished before it was observed injected"
                            .to_string(),
                    })
                }
                Ok(Some(status)) => {
                    debug!("{} not yet injected (phase {})", id, status.phase);
                    PollStep::Pending
                }
                Ok(None) | Err(ChaosError::NotFound(_)) => {
                    warn!("{} not found yet, retrying", id);
                    PollStep::Pending
                }
                Err(e) if e.is_transient() => {
                    warn!("Status poll for {} failed: {}", id, e);
                    PollStep::Pending
                }
                Err(e) => PollStep::Abort(e),
            })
            .await;

        match waited {
            Ok(()) => {
                self.set_phase(&id, LifecyclePhase::Ready);
                self.snapshot(&id)
            }
            Err(e) => {
                if matches!(e, ChaosError::Timeout { .. }) {
                    self.set_phase(&id, LifecyclePhase::TimedOutWaiting);
                }
                warn!("{} stays tracked for cleanup after: {}", id, e);
                Err(e)
            }
        }
    }

    /// Delete the experiment behind `handle`, optionally waiting until it is gone.
    ///
    /// An experiment that is already absent is removed successfully. On timeout
    /// it stays tracked so scope exit tries again. `timeout` defaults to
    /// `delete_timeout`. `handle` ends up `Gone` once absence is confirmed,
    /// `Deleting` when not waiting.
    pub async fn remove(
        &mut self,
        handle: &mut ExperimentHandle,
        wait: bool,
        timeout: Option<Duration>,
    ) -> ChaosResult<()> {
        let timeout = timeout.unwrap_or_else(|| self.config.delete_timeout());
        match self.remove_by_id(handle.id(), wait, timeout).await {
            Ok(phase) => {
                handle.set_phase(phase);
                Ok(())
            }
            Err(e) => {
                if matches!(e, ChaosError::Timeout { .. }) {
                    handle.set_phase(LifecyclePhase::TimedOutDeleting);
                }
                Err(e)
            }
        }
    }

    /// Fetch the current remote status of a tracked experiment
    pub async fn status(
        &mut self,
        handle: &ExperimentHandle,
    ) -> ChaosResult<Option<ExperimentStatus>> {
        let status = self.store.get_status(handle.id()).await?;
        if let (Some(status), Some(tracked)) = (&status, self.tracked.get_mut(handle.id())) {
            tracked.observe(status.phase.clone());
        }
        Ok(status)
    }

    /// Remove every tracked experiment, collecting per-experiment outcomes.
    ///
    /// Never fails: experiments whose removal could not be confirmed are
    /// dropped from tracking, logged and listed in the report.
    pub async fn cleanup_all(&mut self) -> CleanupReport {
        let ids: Vec<ExperimentId> = self.tracked.keys().cloned().collect();
        let mut report = CleanupReport::default();
        if ids.is_empty() {
            return report;
        }

        info!("Cleaning up {} experiment(s)", ids.len());
        let timeout = self.config.delete_timeout();

        for id in ids {
            match self.remove_by_id(&id, true, timeout).await {
                Ok(phase) => report.record(id, phase, None),
                Err(e) => {
                    warn!("{} may be orphaned: {}", id, e);
                    let phase = match self.tracked.remove(&id) {
                        Some(handle) if handle.phase() == LifecyclePhase::TimedOutDeleting => {
                            LifecyclePhase::TimedOutDeleting
                        }
                        _ => LifecyclePhase::Deleting,
                    };
                    report.record(id, phase, Some(e));
                }
            }
        }

        report
    }

    /// Run `body` with this session, then clean up every experiment it left
    /// behind, whether `body` returned `Ok`, `Err` or panicked.
    ///
    /// Cleanup failures are logged and only turn into an error when
    /// `fail_on_orphans` is set and `body` itself succeeded.
    pub async fn scope<T, E, F>(mut self, body: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut ChaosSession) -> BoxFuture<'a, Result<T, E>>,
        E: From<ChaosError>,
    {
        let outcome = AssertUnwindSafe(body(&mut self)).catch_unwind().await;
        let report = self.cleanup_all().await;

        if report.is_clean() {
            if !report.is_empty() {
                info!("Cleanup complete: {} experiment(s) removed", report.len());
            }
        } else {
            for (id, e) in report.failures() {
                error!("{} may need manual removal: {}", id, e);
            }
        }

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(e)) => Err(e),
            Ok(Ok(value)) => {
                if self.config.fail_on_orphans && !report.is_clean() {
                    return Err(ChaosError::CleanupFailed(report).into());
                }
                Ok(value)
            }
        }
    }

    /// Returns the phase the experiment reached: `Gone` when absence was
    /// confirmed, `Deleting` when the delete was only accepted
    async fn remove_by_id(
        &mut self,
        id: &ExperimentId,
        wait: bool,
        timeout: Duration,
    ) -> ChaosResult<LifecyclePhase> {
        if !self.tracked.contains_key(id) {
            warn!("{} is not tracked by this session", id);
        }
        self.set_phase(id, LifecyclePhase::Deleting);

        let store = Arc::clone(&self.store);
        let backoff = self.config.retry_backoff();
        let deleted = retry_transient(
            &backoff,
            self.config.retry_max_attempts,
            &mut self.rng,
            "delete",
            id,
            || store.delete(id),
        )
        .await;

        match deleted {
            Ok(DeleteOutcome::Deleted) => {}
            Ok(DeleteOutcome::NotFound) | Err(ChaosError::NotFound(_)) => {
                warn!("{} was already gone", id);
                self.untrack(id);
                return Ok(LifecyclePhase::Gone);
            }
            Err(e) => return Err(e),
        }

        if !wait {
            self.untrack(id);
            return Ok(LifecyclePhase::Deleting);
        }

        let waited = self
            .poll_until(id, timeout, "deleted", |observed| match observed {
                Ok(None) | Err(ChaosError::NotFound(_)) => PollStep::Done,
                Ok(Some(_)) => PollStep::Pending,
                Err(e) if e.is_transient() => {
                    warn!("Status poll for {} failed: {}", id, e);
                    PollStep::Pending
                }
                Err(e) => PollStep::Abort(e),
            })
            .await;

        match waited {
            Ok(()) => {
                self.untrack(id);
                Ok(LifecyclePhase::Gone)
            }
            Err(e) => {
                if matches!(e, ChaosError::Timeout { .. }) {
                    self.set_phase(id, LifecyclePhase::TimedOutDeleting);
                }
                Err(e)
            }
        }
    }

    /// Poll the experiment's status on the poll backoff until `step` says
    /// done or aborts, or `timeout` elapses
    async fn poll_until<F>(
        &mut self,
        id: &ExperimentId,
        timeout: Duration,
        waiting_for: &'static str,
        mut step: F,
    ) -> ChaosResult<()>
    where
        F: FnMut(ChaosResult<Option<ExperimentStatus>>) -> PollStep,
    {
        let backoff = self.config.poll_backoff();
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .unwrap_or_else(|| far_future(started));
        let mut attempt = 0u32;

        loop {
            let observed = self.store.get_status(id).await;
            if let (Ok(Some(status)), Some(handle)) = (&observed, self.tracked.get_mut(id)) {
                handle.observe(status.phase.clone());
            }

            match step(observed) {
                PollStep::Done => {
                    info!(
                        "{} {} after {:.1}s",
                        id,
                        waiting_for,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(());
                }
                PollStep::Abort(e) => return Err(e),
                PollStep::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ChaosError::Timeout {
                    id: id.clone(),
                    waiting_for,
                    elapsed: now - started,
                });
            }

            let delay = backoff.next_delay(attempt, &mut self.rng).min(deadline - now);
            sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    fn set_phase(&mut self, id: &ExperimentId, phase: LifecyclePhase) {
        if let Some(handle) = self.tracked.get_mut(id) {
            handle.set_phase(phase);
        }
    }

    fn untrack(&mut self, id: &ExperimentId) {
        if self.tracked.remove(id).is_some() {
            info!("{} removed", id);
        }
    }

    fn snapshot(&self, id: &ExperimentId) -> ChaosResult<ExperimentHandle> {
        self.tracked
            .get(id)
            .cloned()
            .ok_or_else(|| ChaosError::NotFound(id.clone()))
    }
}

impl Drop for ChaosSession {
    fn drop(&mut self) {
        for handle in self.tracked.values() {
            error!(
                phase = %handle.phase(),
                "Session dropped while {} is still tracked; it may be orphaned",
                handle.id()
            );
        }
    }
}

/// Deadline used when the requested timeout does not fit in an `Instant`
fn far_future(now: Instant) -> Instant {
    // roughly 30 years, the same horizon tokio uses for unbounded sleeps
    const HORIZON: Duration = Duration::from_secs(86_400 * 365 * 30);
    now.checked_add(HORIZON).unwrap_or(now)
}

/// Run `op` until it succeeds or fails non-transiently, sleeping on `backoff`
/// between attempts. At most `max_attempts` calls are made.
async fn retry_transient<T, F, Fut>(
    backoff: &Backoff,
    max_attempts: u32,
    rng: &mut StdRng,
    operation: &str,
    id: &ExperimentId,
    mut op: F,
) -> ChaosResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChaosResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                let delay = backoff.next_delay(attempt, rng);
                warn!(
                    "{} {} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation,
                    id,
                    attempt + 1,
                    max_attempts,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(ChaosError::Connection(format!(
                    "{} {} failed after {} attempt(s): {}",
                    operation, id, max_attempts, e
                )));
            }
            other => return other,
        }
    }
}
