//! Process-wide configuration for chaos orchestration
//!
//! `ChaosConfig::default()` is usable as-is. `ChaosConfig::load()` reads
//! `CHAOS_*` environment variables (and `.env`). A lazily initialised global
//! copy is available through [`global`] and changed with [`update`]; sessions
//! take their own snapshot at construction.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::backoff::Backoff;
use crate::error::{ChaosError, ChaosResult};

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChaosConfig {
    #[serde(default = "default_api_group")]
    pub api_group: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Total attempts for create/delete on transient failures
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,

    /// Seconds before the first retry
    #[serde(default = "default_retry_min_wait")]
    pub retry_min_wait: f64,

    /// Upper bound in seconds for any single backoff sleep
    #[serde(default = "default_retry_max_wait")]
    pub retry_max_wait: f64,

    /// Base seconds between status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: f64,

    /// Default seconds to wait for injection
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: f64,

    /// Seconds to wait for deletion during cleanup
    #[serde(default = "default_delete_timeout")]
    pub delete_timeout: f64,

    #[serde(default)]
    pub kubeconfig_path: Option<String>,

    /// Turn cleanup failures at scope exit into an error
    #[serde(default)]
    pub fail_on_orphans: bool,
}

fn default_api_group() -> String {
    "chaos-mesh.org".to_string()
}

fn default_api_version() -> String {
    "v1alpha1".to_string()
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_multiplier() -> f64 {
    1.0
}

fn default_retry_min_wait() -> f64 {
    1.0
}

fn default_retry_max_wait() -> f64 {
    10.0
}

fn default_poll_interval() -> f64 {
    2.0
}

fn default_wait_timeout() -> f64 {
    60.0
}

fn default_delete_timeout() -> f64 {
    30.0
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            api_group: default_api_group(),
            api_version: default_api_version(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            retry_min_wait: default_retry_min_wait(),
            retry_max_wait: default_retry_max_wait(),
            poll_interval: default_poll_interval(),
            wait_timeout: default_wait_timeout(),
            delete_timeout: default_delete_timeout(),
            kubeconfig_path: None,
            fail_on_orphans: false,
        }
    }
}

/// Seconds to `Duration`; negative or NaN becomes zero, too large saturates
fn secs(value: f64) -> Duration {
    match Duration::try_from_secs_f64(value) {
        Ok(d) => d,
        Err(_) if value > 0.0 => Duration::MAX,
        Err(_) => Duration::ZERO,
    }
}

impl ChaosConfig {
    /// Load from `CHAOS_*` environment variables, falling back to defaults per field
    pub fn load() -> ChaosResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("CHAOS").try_parsing(true))
            .build()?;

        let config: ChaosConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChaosResult<()> {
        if self.retry_max_attempts == 0 {
            return Err(ChaosError::validation("retry_max_attempts must be at least 1"));
        }
        let positive = [
            ("retry_min_wait", self.retry_min_wait),
            ("retry_max_wait", self.retry_max_wait),
            ("poll_interval", self.poll_interval),
            ("wait_timeout", self.wait_timeout),
            ("delete_timeout", self.delete_timeout),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ChaosError::Validation(format!(
                    "{} must be a positive number of seconds, got {}",
                    field, value
                )));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ChaosError::Validation(format!(
                    "{} of {} seconds is too large",
                    field, value
                )));
            }
        }
        if self.retry_min_wait > self.retry_max_wait {
            return Err(ChaosError::validation(
                "retry_min_wait must not exceed retry_max_wait",
            ));
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Duration {
        secs(self.wait_timeout)
    }

    pub fn delete_timeout(&self) -> Duration {
        secs(self.delete_timeout)
    }

    /// Backoff between create/delete retries
    pub fn retry_backoff(&self) -> Backoff {
        Backoff::new(
            secs(self.retry_min_wait),
            self.retry_backoff_multiplier,
            secs(self.retry_max_wait),
        )
    }

    /// Backoff between status polls while waiting
    pub fn poll_backoff(&self) -> Backoff {
        let base = secs(self.poll_interval);
        Backoff::new(
            base,
            self.retry_backoff_multiplier,
            secs(self.retry_max_wait).max(base),
        )
    }

    /// Apply the set fields of `update`, validating the result
    pub fn apply(&mut self, update: ConfigUpdate) -> ChaosResult<()> {
        let mut next = self.clone();
        if let Some(v) = update.api_group {
            next.api_group = v;
        }
        if let Some(v) = update.api_version {
            next.api_version = v;
        }
        if let Some(v) = update.retry_max_attempts {
            next.retry_max_attempts = v;
        }
        if let Some(v) = update.retry_backoff_multiplier {
            next.retry_backoff_multiplier = v;
        }
        if let Some(v) = update.retry_min_wait {
            next.retry_min_wait = v;
        }
        if let Some(v) = update.retry_max_wait {
            next.retry_max_wait = v;
        }
        if let Some(v) = update.poll_interval {
            next.poll_interval = v;
        }
        if let Some(v) = update.wait_timeout {
            next.wait_timeout = v;
        }
        if let Some(v) = update.delete_timeout {
            next.delete_timeout = v;
        }
        if let Some(v) = update.kubeconfig_path {
            next.kubeconfig_path = Some(v);
        }
        if let Some(v) = update.fail_on_orphans {
            next.fail_on_orphans = v;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

/// Partial configuration change; unset fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub api_group: Option<String>,
    pub api_version: Option<String>,
    pub retry_max_attempts: Option<u32>,
    pub retry_backoff_multiplier: Option<f64>,
    pub retry_min_wait: Option<f64>,
    pub retry_max_wait: Option<f64>,
    pub poll_interval: Option<f64>,
    pub wait_timeout: Option<f64>,
    pub delete_timeout: Option<f64>,
    pub kubeconfig_path: Option<String>,
    pub fail_on_orphans: Option<bool>,
}

fn global_cell() -> &'static RwLock<Arc<ChaosConfig>> {
    static GLOBAL: OnceLock<RwLock<Arc<ChaosConfig>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Arc::new(ChaosConfig::default())))
}

/// Snapshot of the process-wide configuration
pub fn global() -> Arc<ChaosConfig> {
    match global_cell().read() {
        Ok(guard) => Arc::clone(&guard),
        Err(poisoned) => Arc::clone(&poisoned.into_inner()),
    }
}

/// Change the process-wide configuration; existing sessions keep their snapshot
pub fn update(update: ConfigUpdate) -> ChaosResult<()> {
    let mut guard = global_cell()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut next = (**guard).clone();
    next.apply(update)?;
    info!(?next, "Updated chaos configuration");
    *guard = Arc::new(next);
    Ok(())
}

/// Restore defaults (mainly for tests)
pub fn reset() {
    let mut guard = global_cell()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = Arc::new(ChaosConfig::default());
}
