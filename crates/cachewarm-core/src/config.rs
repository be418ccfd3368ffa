use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::app_config::{AppConfig, IterationOrder};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_secs = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        let secs = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(invalid(var, format!("must be a positive number, got {secs}")));
        }
        Duration::try_from_secs_f64(secs).map_err(|e| invalid(var, e.to_string()))?;
        Ok(secs)
    };

    let parse_flag = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        parse_bool(&raw).ok_or_else(|| invalid(var, format!("expected a boolean, got \"{raw}\"")))
    };

    let cache_dir = PathBuf::from(or_default("CACHEWARM_CACHE_DIR", "/tmp"));
    let state_dir = lookup("CACHEWARM_STATE_DIR")
        .map_or_else(|_| cache_dir.join("cachewarm_state"), PathBuf::from);
    let jobs_file = PathBuf::from(or_default("CACHEWARM_JOBS_FILE", "./cronjobs.json"));

    let probability = {
        let raw = or_default("CACHEWARM_PROBABILITY", "0.03");
        let p = raw
            .trim()
            .parse::<f64>()
            .map_err(|e| invalid("CACHEWARM_PROBABILITY", e.to_string()))?;
        if !(0.0..=1.0).contains(&p) {
            return Err(invalid(
                "CACHEWARM_PROBABILITY",
                format!("must be within 0..=1, got {p}"),
            ));
        }
        p
    };

    let budget_ms = parse_u64("CACHEWARM_BUDGET_MS", "300")?;
    let force_budget_multiplier = parse_u64("CACHEWARM_FORCE_BUDGET_MULTIPLIER", "10")?.max(1);
    let timeout_secs = parse_secs("CACHEWARM_TIMEOUT_SECS", "1.2")?;
    let connect_timeout_secs = parse_secs("CACHEWARM_CONNECT_TIMEOUT_SECS", "1.0")?;
    let max_backoff_secs = parse_u64("CACHEWARM_MAX_BACKOFF_SECS", "3600")?.max(1);

    let iteration_order = parse_iteration_order(&or_default("CACHEWARM_ITERATION_ORDER", "list"))?;

    let user_agent = or_default("CACHEWARM_USER_AGENT", "cachewarm/0.1 (+cache-warm)");

    let debug_remote = parse_flag("CACHEWARM_DEBUG_REMOTE", "false")?;
    let debug_allowlist = or_default("CACHEWARM_DEBUG_ALLOWLIST", "127.0.0.1,::1")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| invalid("CACHEWARM_DEBUG_ALLOWLIST", format!("{s}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let debug_token = lookup("CACHEWARM_DEBUG_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let s3_endpoint = lookup("CACHEWARM_S3_ENDPOINT")
        .ok()
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty());
    let s3_path_style = parse_flag("CACHEWARM_S3_PATH_STYLE", "false")?;

    let bind_addr = {
        let raw = or_default("CACHEWARM_BIND_ADDR", "127.0.0.1:8080");
        raw.parse::<SocketAddr>()
            .map_err(|e| invalid("CACHEWARM_BIND_ADDR", e.to_string()))?
    };
    let cron = lookup("CACHEWARM_CRON")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let log_level = or_default("CACHEWARM_LOG_LEVEL", "info");

    Ok(AppConfig {
        cache_dir,
        state_dir,
        jobs_file,
        probability,
        budget_ms,
        force_budget_multiplier,
        timeout_secs,
        connect_timeout_secs,
        max_backoff_secs,
        iteration_order,
        user_agent,
        debug_remote,
        debug_allowlist,
        debug_token,
        s3_endpoint,
        s3_path_style,
        bind_addr,
        cron,
        log_level,
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_iteration_order(raw: &str) -> Result<IterationOrder, ConfigError> {
    match raw.trim() {
        "list" => Ok(IterationOrder::List),
        "rotating" => Ok(IterationOrder::Rotating),
        other => Err(ConfigError::InvalidEnvVar {
            var: "CACHEWARM_ITERATION_ORDER".to_string(),
            reason: format!("expected \"list\" or \"rotating\", got \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
