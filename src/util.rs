//! Small parsing and naming helpers shared by the experiment builders

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ChaosError, ChaosResult};

/// Generate a DNS-safe experiment name: `{prefix}-{unix seconds}-{4 hex chars}`
pub fn generate_unique_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, Utc::now().timestamp(), &suffix[..4])
}

/// Split `"100ms"` into `(100, "ms")`
fn split_number_unit(value: &str) -> Option<(u64, &str)> {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let number = value[..digits].parse().ok()?;
    Some((number, &value[digits..]))
}

/// Parse an experiment duration such as `30s`, `5m` or `2h`
pub fn parse_duration(value: &str) -> ChaosResult<Duration> {
    let invalid = || {
        ChaosError::Validation(format!(
            "invalid duration '{}': expected <number><unit> with unit s, m or h",
            value
        ))
    };

    let (number, unit) = split_number_unit(value).ok_or_else(invalid)?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };
    number
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Validate a tc-style time value (latency, jitter): `<number>` followed by ns, us, ms, s or m
pub fn validate_network_duration(value: &str, field: &str) -> ChaosResult<()> {
    match split_number_unit(value) {
        Some((_, "ns" | "us" | "ms" | "s" | "m")) => Ok(()),
        _ => Err(ChaosError::Validation(format!(
            "invalid {} '{}': expected <number><unit> with unit ns, us, ms, s or m (e.g. '5ms')",
            field, value
        ))),
    }
}

/// Validate a percentage given as a string, between 0 and 100 inclusive
pub fn validate_percentage(value: &str, field: &str) -> ChaosResult<()> {
    match value.parse::<f64>() {
        Ok(p) if (0.0..=100.0).contains(&p) => Ok(()),
        _ => Err(ChaosError::Validation(format!(
            "invalid {} '{}': must be a number between 0 and 100",
            field, value
        ))),
    }
}
