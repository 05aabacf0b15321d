//! Config resolver precedence: presets, legacy env takeover, JSON
//! overrides, and the purity law.

mod common;

use common::config_from;
use textforge::config::{validate_cache_custom_json, validate_resilience_custom_json};
use textforge::prelude::*;
use textforge::ServiceError;

#[test]
fn preset_is_the_base_layer() {
    let config = config_from(&[("RESILIENCE_PRESET", "production"), ("CACHE_PRESET", "production")]);
    assert_eq!(config.resilience.preset, "production");
    assert_eq!(config.resilience.retry.max_attempts, 5);
    assert_eq!(config.resilience.breaker.failure_threshold, 10);
    assert_eq!(config.cache.default_ttl_s, 7200);
    assert_eq!(config.cache.memory_cache_size, 500);
}

#[test]
fn any_legacy_var_switches_resilience_to_legacy_mode() {
    let config = config_from(&[
        ("RESILIENCE_PRESET", "production"),
        ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "2"),
        // Ignored wholesale in legacy mode.
        ("RESILIENCE_CUSTOM_CONFIG", r#"{"retry_attempts": 9}"#),
    ]);

    assert_eq!(config.resilience.preset, "legacy");
    assert_eq!(config.resilience.breaker.failure_threshold, 2);
    // Custom JSON did not apply; legacy defaults did.
    assert_eq!(config.resilience.retry.max_attempts, 3);
    // Built-in per-operation defaults apply in legacy mode.
    assert_eq!(config.strategy_for("sentiment"), StrategyKind::Aggressive);
    assert_eq!(config.strategy_for("qa"), StrategyKind::Conservative);
}

#[test]
fn custom_json_layers_on_top_of_preset() {
    let config = config_from(&[
        ("RESILIENCE_PRESET", "simple"),
        (
            "RESILIENCE_CUSTOM_CONFIG",
            r#"{"retry_attempts": 4, "operation_overrides": {"questions": "critical"}}"#,
        ),
    ]);
    assert_eq!(config.resilience.retry.max_attempts, 4);
    assert_eq!(config.strategy_for("questions"), StrategyKind::Critical);
    // Untouched values stay at the preset.
    assert_eq!(config.resilience.breaker.failure_threshold, 5);
}

#[test]
fn invalid_custom_json_keeps_the_preset() {
    let broken = config_from(&[("RESILIENCE_CUSTOM_CONFIG", "{oops")]);
    assert_eq!(broken.resilience.retry.max_attempts, 3);

    let unknown_key = config_from(&[(
        "RESILIENCE_CUSTOM_CONFIG",
        r#"{"retry_attempts": 9, "warp_factor": 9}"#,
    )]);
    assert_eq!(unknown_key.resilience.retry.max_attempts, 3);
}

#[test]
fn cache_env_overrides_beat_preset_and_custom_applies_last() {
    let config = config_from(&[
        ("CACHE_PRESET", "production"),
        ("CACHE_REDIS_URL", "redis://cache.prod.internal:6379"),
        ("ENABLE_AI_CACHE", "true"),
        ("CACHE_CUSTOM_CONFIG", r#"{"default_ttl": 900}"#),
    ]);
    assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache.prod.internal:6379"));
    assert!(config.cache.ai.is_some());
    assert_eq!(config.cache.default_ttl_s, 900);
    // Values neither env nor custom touched stay at the preset.
    assert_eq!(config.cache.memory_cache_size, 500);
}

#[test]
fn unknown_presets_and_bad_urls_are_fatal() {
    let env = |pairs: &[(&str, &str)]| {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<std::collections::BTreeMap<_, _>>();
        ConfigBuilder::new(EnvSource::from_map(vars)).build()
    };

    assert!(matches!(
        env(&[("RESILIENCE_PRESET", "extreme")]).unwrap_err(),
        ServiceError::Configuration { .. }
    ));
    assert!(matches!(
        env(&[("CACHE_PRESET", "galactic")]).unwrap_err(),
        ServiceError::Configuration { .. }
    ));
    assert!(matches!(
        env(&[("CACHE_REDIS_URL", "memcached://host")]).unwrap_err(),
        ServiceError::Configuration { .. }
    ));
    assert!(matches!(
        env(&[("CACHE_OPERATION_TTLS", "not json")]).unwrap_err(),
        ServiceError::Configuration { .. }
    ));
}

#[test]
fn validation_api_reports_errors_and_warnings() {
    let result = validate_resilience_custom_json(r#"{"retry_attempts": 0}"#);
    assert!(!result.is_valid());

    let result = validate_resilience_custom_json(r#"{"retry_attempts": 3}"#);
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());

    let result = validate_resilience_custom_json(
        r#"{"exponential_min": 9.0, "exponential_max": 3.0}"#,
    );
    assert!(result.is_valid());
    assert_eq!(result.warnings.len(), 1);

    let result = validate_cache_custom_json(r#"{"compression_level": 12}"#);
    assert!(!result.is_valid());

    let result = validate_cache_custom_json(r#"{"operation_ttls": {"summarize": 60}}"#);
    assert!(result.is_valid());
}

#[test]
fn build_is_pure_for_equal_inputs() {
    let pairs = [
        ("RESILIENCE_PRESET", "development"),
        ("CACHE_PRESET", "ai-development"),
        ("RESILIENCE_CUSTOM_CONFIG", r#"{"retry_attempts": 2}"#),
        ("HEALTH_CHECK_TIMEOUT_MS", "1500"),
    ];
    let a = config_from(&pairs);
    let b = config_from(&pairs);
    assert_eq!(*a, *b);
}

#[test]
fn reload_swaps_to_a_new_snapshot() {
    let handle = ConfigHandle::new((*config_from(&[])).clone());
    let before = handle.load();
    assert_eq!(before.cache.preset, "development");

    handle.reload((*config_from(&[("CACHE_PRESET", "production")])).clone());
    let after = handle.load();
    assert_eq!(after.cache.preset, "production");
    // The old snapshot is still intact for readers that grabbed it earlier.
    assert_eq!(before.cache.preset, "development");
}

#[test]
fn health_tuning_resolves_per_component() {
    let config = config_from(&[
        ("HEALTH_CHECK_TIMEOUT_MS", "3000"),
        ("HEALTH_CHECK_AI_MODEL_TIMEOUT_MS", "5000"),
        ("HEALTH_CHECK_RETRY_COUNT", "0"),
        ("HEALTH_CHECK_ENABLED_COMPONENTS", "ai_model,cache"),
    ]);
    assert_eq!(config.health.timeout_for("ai_model").as_millis(), 5000);
    assert_eq!(config.health.timeout_for("cache").as_millis(), 3000);
    assert_eq!(config.health.retry_count, 0);
    assert_eq!(config.health.enabled_components, vec!["ai_model", "cache"]);
}
