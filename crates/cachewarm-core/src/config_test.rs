use std::collections::HashMap;
use std::env::VarError;
use std::path::Path;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

#[test]
fn build_app_config_defaults_with_empty_env() {
    let map = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.cache_dir, Path::new("/tmp"));
    assert_eq!(cfg.state_dir, Path::new("/tmp/cachewarm_state"));
    assert_eq!(cfg.jobs_file, Path::new("./cronjobs.json"));
    assert!((cfg.probability - 0.03).abs() < f64::EPSILON);
    assert_eq!(cfg.budget_ms, 300);
    assert_eq!(cfg.force_budget_multiplier, 10);
    assert!((cfg.timeout_secs - 1.2).abs() < f64::EPSILON);
    assert!((cfg.connect_timeout_secs - 1.0).abs() < f64::EPSILON);
    assert_eq!(cfg.max_backoff_secs, 3600);
    assert_eq!(cfg.iteration_order, IterationOrder::List);
    assert_eq!(cfg.user_agent, "cachewarm/0.1 (+cache-warm)");
    assert!(!cfg.debug_remote);
    assert_eq!(cfg.debug_allowlist.len(), 2);
    assert!(cfg.debug_token.is_none());
    assert!(cfg.s3_endpoint.is_none());
    assert!(!cfg.s3_path_style);
    assert_eq!(cfg.bind_addr.to_string(), "127.0.0.1:8080");
    assert!(cfg.cron.is_none());
    assert_eq!(cfg.log_level, "info");
}

#[test]
fn state_dir_follows_cache_dir_unless_overridden() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_CACHE_DIR", "/var/cache/app");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.state_dir, Path::new("/var/cache/app/cachewarm_state"));

    map.insert("CACHEWARM_STATE_DIR", "/var/lib/cachewarm");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.state_dir, Path::new("/var/lib/cachewarm"));
}

#[test]
fn probability_out_of_range_is_rejected() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_PROBABILITY", "1.5");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_PROBABILITY"),
        "expected InvalidEnvVar(CACHEWARM_PROBABILITY), got: {result:?}"
    );
}

#[test]
fn budget_ms_invalid() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_BUDGET_MS", "not-a-number");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_BUDGET_MS"),
        "expected InvalidEnvVar(CACHEWARM_BUDGET_MS), got: {result:?}"
    );
}

#[test]
fn timeout_secs_must_be_positive() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_TIMEOUT_SECS", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_TIMEOUT_SECS"),
        "expected InvalidEnvVar(CACHEWARM_TIMEOUT_SECS), got: {result:?}"
    );
}

#[test]
fn timeout_secs_too_large_for_a_duration_is_rejected() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_TIMEOUT_SECS", "1e20");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_TIMEOUT_SECS"),
        "expected InvalidEnvVar(CACHEWARM_TIMEOUT_SECS), got: {result:?}"
    );
}

#[test]
fn timeout_secs_override_accepts_fractions() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_TIMEOUT_SECS", "2.5");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.timeout().as_millis(), 2500);
}

#[test]
fn iteration_order_rotating() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_ITERATION_ORDER", "rotating");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.iteration_order, IterationOrder::Rotating);
}

#[test]
fn iteration_order_unknown_fails() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_ITERATION_ORDER", "random");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_ITERATION_ORDER"),
        "expected InvalidEnvVar(CACHEWARM_ITERATION_ORDER), got: {result:?}"
    );
}

#[test]
fn debug_remote_accepts_numeric_flag() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_DEBUG_REMOTE", "1");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.debug_remote);
}

#[test]
fn debug_remote_rejects_garbage() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_DEBUG_REMOTE", "maybe");
    assert!(build_app_config(lookup_from_map(&map)).is_err());
}

#[test]
fn debug_allowlist_parses_ip_list() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_DEBUG_ALLOWLIST", "10.0.0.1, 192.168.1.7 ,");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let ips: Vec<String> = cfg.debug_allowlist.iter().map(ToString::to_string).collect();
    assert_eq!(ips, vec!["10.0.0.1", "192.168.1.7"]);
}

#[test]
fn debug_allowlist_rejects_hostnames() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_DEBUG_ALLOWLIST", "localhost");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "CACHEWARM_DEBUG_ALLOWLIST"),
        "expected InvalidEnvVar(CACHEWARM_DEBUG_ALLOWLIST), got: {result:?}"
    );
}

#[test]
fn s3_endpoint_trailing_slash_is_trimmed() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_S3_ENDPOINT", "https://nyc3.digitaloceanspaces.com/");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(
        cfg.s3_endpoint.as_deref(),
        Some("https://nyc3.digitaloceanspaces.com")
    );
}

#[test]
fn debug_token_is_redacted_in_debug_output() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_DEBUG_TOKEN", "super-secret");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("super-secret"));
    assert!(rendered.contains("[redacted]"));
}

#[test]
fn empty_cron_is_treated_as_unset() {
    let mut map = HashMap::new();
    map.insert("CACHEWARM_CRON", "  ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.cron.is_none());
}
