//! Delete chaos experiments left behind by crashed runs
//!
//! Environment:
//! - `CHAOS_SWEEP_NAMESPACE` (default `default`)
//! - `CHAOS_SWEEP_SELECTOR` (default: experiments created by this library)
//! - `CHAOS_SWEEP_DRY_RUN` (default `true`; set `false` to actually delete)
//! - `CHAOS_SWEEP_JSON_LOGS` (default `false`)
//!
//! plus every `CHAOS_*` setting understood by `ChaosConfig::load`.

use anyhow::{Context, Result};

use chaos_lifecycle::{
    chaos::{MANAGED_BY_LABEL, MANAGED_BY_VALUE},
    sweep_orphans, telemetry, ChaosConfig, KubeChaosStore,
};

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .to_ascii_lowercase()
            .parse()
            .with_context(|| format!("{} must be true or false, got {:?}", name, value)),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if env_flag("CHAOS_SWEEP_JSON_LOGS", false)? {
        telemetry::init_json_tracing();
    } else {
        telemetry::init_tracing();
    }

    let namespace =
        std::env::var("CHAOS_SWEEP_NAMESPACE").unwrap_or_else(|_| "default".to_string());
    let selector = std::env::var("CHAOS_SWEEP_SELECTOR")
        .unwrap_or_else(|_| format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE));
    let dry_run = env_flag("CHAOS_SWEEP_DRY_RUN", true)?;

    let config = ChaosConfig::load().context("Failed to load chaos configuration")?;
    tracing::info!("Configuration loaded");

    let store = KubeChaosStore::new(&config)
        .await
        .context("Failed to connect to Kubernetes")?;

    tracing::info!(
        namespace = %namespace,
        selector = %selector,
        dry_run,
        "Sweeping orphaned chaos experiments"
    );

    let cleaned = sweep_orphans(&store, &namespace, &selector, dry_run).await;

    if dry_run {
        tracing::info!("{} experiment(s) would be deleted", cleaned);
    } else {
        tracing::info!("{} experiment(s) deleted", cleaned);
    }

    Ok(())
}
