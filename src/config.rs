//! Runtime configuration resolver.
//!
//! Merges three sources into one immutable `RuntimeConfig` with fixed
//! precedence: named presets as the base, legacy environment variables
//! (which take over resilience wholesale when present), and validated JSON
//! overrides. Components never read the environment themselves; they
//! receive the already-built config.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::Operation;
use crate::error::ServiceError;
use crate::presets::{
    cache_preset, default_operation_strategy, resilience_preset, StrategyKind,
};

/// Default ceiling on input text when no AI cache tuning is configured.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 100_000;

/// TTL for cached fallback responses, kept short so degraded answers do not
/// outlive the outage.
pub const FALLBACK_TTL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Environment snapshot
// ---------------------------------------------------------------------------

/// Immutable snapshot of the environment variables the resolver recognizes.
/// Building from a snapshot keeps `build` pure: equal inputs produce equal
/// configs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvSource {
    vars: BTreeMap<String, String>,
}

impl EnvSource {
    /// Snapshot the process environment.
    pub fn from_process() -> Self {
        Self { vars: std::env::vars().collect() }
    }

    /// Build from an explicit map (tests, embedding).
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Parse a numeric variable, warning and falling back on garbage.
    fn parsed_or<T: std::str::FromStr + Copy>(&self, name: &str, fallback: T) -> T {
        match self.get(name) {
            None => fallback,
            Some(raw) => match raw.parse() {
                Ok(v) => v,
                Err(_) => {
                    warn!(var = name, value = raw, "invalid numeric env value, using default");
                    fallback
                }
            },
        }
    }

    /// Parse a boolean variable: true/1/yes/on, false/0/no/off.
    fn bool_or(&self, name: &str, fallback: bool) -> bool {
        match self.get(name) {
            None => fallback,
            Some(raw) => match parse_bool(raw) {
                Some(v) => v,
                None => {
                    warn!(var = name, value = raw, "invalid boolean env value, using default");
                    fallback
                }
            },
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Settings value types
// ---------------------------------------------------------------------------

/// Upstream model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub model: String,
    /// Sampling temperature in `[0.0, 2.0]`.
    pub temperature: f64,
    pub max_batch_requests_per_call: u32,
    pub batch_concurrency_limit: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.7,
            max_batch_requests_per_call: 50,
            batch_concurrency_limit: 5,
        }
    }
}

/// Retry knobs for one strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryTuning {
    pub max_attempts: usize,
    /// Total backoff budget across one call, in seconds.
    pub max_delay_s: u64,
    pub exp_min: f64,
    pub exp_max: f64,
    pub exp_multiplier: f64,
    pub jitter_enabled: bool,
    pub jitter_max_s: f64,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_delay_s: 30,
            exp_min: 2.0,
            exp_max: 10.0,
            exp_multiplier: 1.0,
            jitter_enabled: true,
            jitter_max_s: 2.0,
        }
    }
}

/// Circuit breaker knobs for one strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerTuning {
    pub failure_threshold: usize,
    pub recovery_timeout_s: u64,
    pub half_open_max_calls: usize,
}

impl Default for BreakerTuning {
    fn default() -> Self {
        Self { failure_threshold: 5, recovery_timeout_s: 60, half_open_max_calls: 2 }
    }
}

/// Resolved resilience settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceSettings {
    /// Preset the config came from; `"legacy"` when legacy env vars won.
    pub preset: String,
    pub default_strategy: StrategyKind,
    /// Operation name → strategy tag. Unknown operations fall back to the
    /// default strategy.
    pub operation_strategies: BTreeMap<String, StrategyKind>,
    pub retry: RetryTuning,
    pub breaker: BreakerTuning,
    pub resilience_enabled: bool,
    pub retry_enabled: bool,
    pub circuit_breaker_enabled: bool,
}

impl ResilienceSettings {
    /// Strategy tag for an operation name; unknown names get the default.
    pub fn strategy_for(&self, operation: &str) -> StrategyKind {
        self.operation_strategies.get(operation).copied().unwrap_or(self.default_strategy)
    }
}

/// Character-count boundaries between text tiers. Half-open: a text of
/// exactly `small` chars is medium tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSizeTiers {
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

impl Default for TextSizeTiers {
    fn default() -> Self {
        Self { small: 500, medium: 5000, large: 50_000 }
    }
}

impl TextSizeTiers {
    pub fn is_ascending(&self) -> bool {
        self.small < self.medium && self.medium < self.large
    }
}

/// Hash used for cache-key text digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(HashAlgorithm::Sha256),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

/// AI-specific cache tuning, present when the AI cache subsection is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiCacheTuning {
    pub text_hash_threshold: usize,
    pub hash_algorithm: HashAlgorithm,
    pub enable_smart_promotion: bool,
    pub max_text_length: usize,
}

impl Default for AiCacheTuning {
    fn default() -> Self {
        Self {
            text_hash_threshold: 1000,
            hash_algorithm: HashAlgorithm::Sha256,
            enable_smart_promotion: true,
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

/// Resolved cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub preset: String,
    pub enabled: bool,
    pub redis_url: Option<String>,
    pub redis_password: Option<String>,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub default_ttl_s: u64,
    pub memory_cache_size: usize,
    pub max_connections: u32,
    pub compression_threshold_bytes: usize,
    pub compression_level: u32,
    pub text_size_tiers: TextSizeTiers,
    pub operation_ttls: BTreeMap<String, u64>,
    pub ai: Option<AiCacheTuning>,
}

impl CacheSettings {
    /// TTL for one operation, falling back to the default TTL.
    pub fn ttl_for(&self, operation: Operation) -> Duration {
        let secs =
            self.operation_ttls.get(operation.as_str()).copied().unwrap_or(self.default_ttl_s);
        Duration::from_secs(secs)
    }

    pub fn max_text_length(&self) -> usize {
        self.ai.map_or(DEFAULT_MAX_TEXT_LENGTH, |ai| ai.max_text_length)
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.ai.map(|ai| ai.hash_algorithm).unwrap_or_default()
    }

    pub fn smart_promotion_enabled(&self) -> bool {
        self.ai.map(|ai| ai.enable_smart_promotion).unwrap_or(false)
    }
}

/// Resolved health-check settings.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSettings {
    pub default_timeout_ms: u64,
    pub per_component_timeouts_ms: BTreeMap<String, u64>,
    pub retry_count: u32,
    pub backoff_base_s: f64,
    pub enabled_components: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 2000,
            per_component_timeouts_ms: BTreeMap::new(),
            retry_count: 1,
            backoff_base_s: 0.1,
            enabled_components: vec![
                "ai_model".to_string(),
                "cache".to_string(),
                "resilience".to_string(),
            ],
        }
    }
}

impl HealthSettings {
    pub fn timeout_for(&self, component: &str) -> Duration {
        let ms =
            self.per_component_timeouts_ms.get(component).copied().unwrap_or(self.default_timeout_ms);
        Duration::from_millis(ms)
    }
}

/// Keys and origins for the thin transport layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SecuritySettings {
    pub allowed_origins: Vec<String>,
    pub api_key: String,
    pub additional_api_keys: Vec<String>,
}

/// The single immutable runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub ai: AiConfig,
    pub resilience: ResilienceSettings,
    pub cache: CacheSettings,
    pub health: HealthSettings,
    pub security: SecuritySettings,
}

impl RuntimeConfig {
    pub fn strategy_for(&self, operation: &str) -> StrategyKind {
        self.resilience.strategy_for(operation)
    }
}

/// Process-wide reloadable handle. A reload swaps in a freshly built
/// instance; readers always see a consistent snapshot.
#[derive(Debug)]
pub struct ConfigHandle {
    inner: ArcSwap<RuntimeConfig>,
}

impl ConfigHandle {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { inner: ArcSwap::from_pointee(config) }
    }

    pub fn load(&self) -> Arc<RuntimeConfig> {
        self.inner.load_full()
    }

    pub fn reload(&self, config: RuntimeConfig) {
        self.inner.store(Arc::new(config));
    }
}

// ---------------------------------------------------------------------------
// Validation results
// ---------------------------------------------------------------------------

/// Outcome of validating a custom JSON override; used by admin endpoints
/// and internally before an override is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub const RESILIENCE_PRESET_VAR: &str = "RESILIENCE_PRESET";
pub const RESILIENCE_CUSTOM_CONFIG_VAR: &str = "RESILIENCE_CUSTOM_CONFIG";
pub const CACHE_PRESET_VAR: &str = "CACHE_PRESET";
pub const CACHE_CUSTOM_CONFIG_VAR: &str = "CACHE_CUSTOM_CONFIG";
pub const CACHE_REDIS_URL_VAR: &str = "CACHE_REDIS_URL";
pub const ENABLE_AI_CACHE_VAR: &str = "ENABLE_AI_CACHE";
pub const CACHE_OPERATION_TTLS_VAR: &str = "CACHE_OPERATION_TTLS";

/// Legacy resilience variables. Presence of any of these switches the
/// resilience section into legacy mode: env + defaults, custom JSON ignored.
const LEGACY_RESILIENCE_VARS: [&str; 12] = [
    "RETRY_MAX_ATTEMPTS",
    "RETRY_MAX_DELAY",
    "RETRY_EXPONENTIAL_MULTIPLIER",
    "RETRY_EXPONENTIAL_MIN",
    "RETRY_EXPONENTIAL_MAX",
    "RETRY_JITTER_ENABLED",
    "RETRY_JITTER_MAX",
    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
    "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
    "CIRCUIT_BREAKER_ENABLED",
    "RETRY_ENABLED",
    "RESILIENCE_ENABLED",
];

const DEFAULT_RESILIENCE_STRATEGY_VAR: &str = "DEFAULT_RESILIENCE_STRATEGY";

fn operation_strategy_var(operation: Operation) -> String {
    format!("{}_RESILIENCE_STRATEGY", operation.as_str().to_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a validated [`RuntimeConfig`] from presets, env, and overrides.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    env: EnvSource,
    resilience_preset: Option<String>,
    cache_preset: Option<String>,
    resilience_custom: Option<String>,
    cache_custom: Option<String>,
    ai: Option<AiConfig>,
    security: Option<SecuritySettings>,
}

impl ConfigBuilder {
    pub fn new(env: EnvSource) -> Self {
        Self { env, ..Self::default() }
    }

    pub fn from_process_env() -> Self {
        Self::new(EnvSource::from_process())
    }

    /// Preset used when `RESILIENCE_PRESET` is not set.
    pub fn resilience_preset(mut self, name: impl Into<String>) -> Self {
        self.resilience_preset = Some(name.into());
        self
    }

    /// Preset used when `CACHE_PRESET` is not set.
    pub fn cache_preset(mut self, name: impl Into<String>) -> Self {
        self.cache_preset = Some(name.into());
        self
    }

    /// Custom resilience JSON used when `RESILIENCE_CUSTOM_CONFIG` is not set.
    pub fn resilience_custom_json(mut self, json: impl Into<String>) -> Self {
        self.resilience_custom = Some(json.into());
        self
    }

    /// Custom cache JSON used when `CACHE_CUSTOM_CONFIG` is not set.
    pub fn cache_custom_json(mut self, json: impl Into<String>) -> Self {
        self.cache_custom = Some(json.into());
        self
    }

    pub fn ai(mut self, ai: AiConfig) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn security(mut self, security: SecuritySettings) -> Self {
        self.security = Some(security);
        self
    }

    /// Resolve everything into an immutable config.
    ///
    /// # Errors
    ///
    /// `ServiceError::Configuration` for unknown preset names, a malformed
    /// `CACHE_REDIS_URL`, malformed `CACHE_OPERATION_TTLS`, or out-of-range
    /// health tuning. Invalid custom JSON and malformed numeric env values
    /// are logged and dropped instead.
    pub fn build(&self) -> Result<RuntimeConfig, ServiceError> {
        let resilience = self.build_resilience()?;
        let cache = self.build_cache()?;
        let health = self.build_health()?;
        Ok(RuntimeConfig {
            ai: self.ai.clone().unwrap_or_default(),
            resilience,
            cache,
            health,
            security: self.security.clone().unwrap_or_default(),
        })
    }

    fn legacy_mode(&self) -> bool {
        LEGACY_RESILIENCE_VARS.iter().any(|v| self.env.contains(v))
            || self.env.contains(DEFAULT_RESILIENCE_STRATEGY_VAR)
            || Operation::ALL.iter().any(|op| self.env.contains(&operation_strategy_var(*op)))
    }

    fn build_resilience(&self) -> Result<ResilienceSettings, ServiceError> {
        if self.legacy_mode() {
            if self.env.contains(RESILIENCE_CUSTOM_CONFIG_VAR) || self.resilience_custom.is_some() {
                info!(
                    "legacy resilience environment variables present; custom JSON override ignored"
                );
            }
            return Ok(self.build_resilience_legacy());
        }

        let preset_name = self
            .env
            .get(RESILIENCE_PRESET_VAR)
            .map(str::to_string)
            .or_else(|| self.resilience_preset.clone())
            .unwrap_or_else(|| "simple".to_string());
        let preset = resilience_preset(&preset_name).ok_or_else(|| {
            ServiceError::configuration("unknown resilience preset")
                .with_context("preset", preset_name.clone())
                .with_context("allowed", "simple, development, production")
        })?;

        let mut settings = ResilienceSettings {
            preset: preset_name,
            default_strategy: preset.default_strategy,
            operation_strategies: preset.operation_overrides.clone(),
            retry: preset.retry,
            breaker: preset.breaker,
            resilience_enabled: true,
            retry_enabled: true,
            circuit_breaker_enabled: true,
        };

        let custom = self
            .env
            .get(RESILIENCE_CUSTOM_CONFIG_VAR)
            .map(str::to_string)
            .or_else(|| self.resilience_custom.clone());
        if let Some(raw) = custom {
            match serde_json::from_str::<Value>(&raw) {
                Err(err) => {
                    warn!(error = %err, "invalid resilience custom config JSON, keeping preset");
                }
                Ok(value) => {
                    let result = validate_resilience_custom(&value);
                    for w in &result.warnings {
                        warn!(warning = %w, "resilience custom config");
                    }
                    if result.is_valid() {
                        apply_resilience_custom(&mut settings, &value);
                    } else {
                        for e in &result.errors {
                            warn!(error = %e, "resilience custom config rejected");
                        }
                    }
                }
            }
        }

        Ok(settings)
    }

    /// Legacy mode: resilience built entirely from env over the historical
    /// defaults; presets and custom JSON do not participate.
    fn build_resilience_legacy(&self) -> ResilienceSettings {
        let defaults = RetryTuning::default();
        let retry = RetryTuning {
            max_attempts: positive_or(
                &self.env,
                "RETRY_MAX_ATTEMPTS",
                defaults.max_attempts,
            ),
            max_delay_s: positive_or(&self.env, "RETRY_MAX_DELAY", defaults.max_delay_s),
            exp_multiplier: positive_f64_or(
                &self.env,
                "RETRY_EXPONENTIAL_MULTIPLIER",
                defaults.exp_multiplier,
            ),
            exp_min: positive_f64_or(&self.env, "RETRY_EXPONENTIAL_MIN", defaults.exp_min),
            exp_max: positive_f64_or(&self.env, "RETRY_EXPONENTIAL_MAX", defaults.exp_max),
            jitter_enabled: self.env.bool_or("RETRY_JITTER_ENABLED", defaults.jitter_enabled),
            jitter_max_s: positive_f64_or(&self.env, "RETRY_JITTER_MAX", defaults.jitter_max_s),
        };
        let breaker_defaults = BreakerTuning::default();
        let breaker = BreakerTuning {
            failure_threshold: positive_or(
                &self.env,
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                breaker_defaults.failure_threshold,
            ),
            recovery_timeout_s: positive_or(
                &self.env,
                "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
                breaker_defaults.recovery_timeout_s,
            ),
            half_open_max_calls: breaker_defaults.half_open_max_calls,
        };

        let default_strategy = match self.env.get(DEFAULT_RESILIENCE_STRATEGY_VAR) {
            None => StrategyKind::Balanced,
            Some(raw) => StrategyKind::parse(raw).unwrap_or_else(|| {
                warn!(value = raw, "invalid default resilience strategy, using balanced");
                StrategyKind::Balanced
            }),
        };

        let mut operation_strategies = BTreeMap::new();
        for op in Operation::ALL {
            let var = operation_strategy_var(op);
            let kind = match self.env.get(&var) {
                None => default_operation_strategy(op),
                Some(raw) => StrategyKind::parse(raw).unwrap_or_else(|| {
                    warn!(var = %var, value = raw, "invalid operation strategy, using default");
                    default_operation_strategy(op)
                }),
            };
            operation_strategies.insert(op.as_str().to_string(), kind);
        }

        ResilienceSettings {
            preset: "legacy".to_string(),
            default_strategy,
            operation_strategies,
            retry,
            breaker,
            resilience_enabled: self.env.bool_or("RESILIENCE_ENABLED", true),
            retry_enabled: self.env.bool_or("RETRY_ENABLED", true),
            circuit_breaker_enabled: self.env.bool_or("CIRCUIT_BREAKER_ENABLED", true),
        }
    }

    fn build_cache(&self) -> Result<CacheSettings, ServiceError> {
        let preset_name = self
            .env
            .get(CACHE_PRESET_VAR)
            .map(str::to_string)
            .or_else(|| self.cache_preset.clone())
            .unwrap_or_else(|| "development".to_string());
        let preset = cache_preset(&preset_name).ok_or_else(|| {
            ServiceError::configuration("unknown cache preset")
                .with_context("preset", preset_name.clone())
        })?;

        let mut settings = CacheSettings {
            preset: preset_name,
            enabled: preset.enabled,
            redis_url: preset.enabled.then(|| "redis://redis:6379".to_string()),
            redis_password: None,
            tls_cert_path: None,
            tls_key_path: None,
            default_ttl_s: preset.default_ttl_s,
            memory_cache_size: preset.memory_cache_size,
            max_connections: preset.max_connections,
            compression_threshold_bytes: preset.compression_threshold_bytes,
            compression_level: preset.compression_level,
            text_size_tiers: preset.text_size_tiers,
            operation_ttls: preset.operation_ttls,
            ai: preset.ai,
        };

        // Specific env vars always override the preset.
        if let Some(url) = self.env.get(CACHE_REDIS_URL_VAR) {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(ServiceError::configuration(
                    "CACHE_REDIS_URL must start with redis:// or rediss://",
                )
                .with_context("url", url));
            }
            settings.redis_url = Some(url.to_string());
        }
        if let Some(raw) = self.env.get(ENABLE_AI_CACHE_VAR) {
            match parse_bool(raw) {
                Some(true) => {
                    settings.ai.get_or_insert_with(AiCacheTuning::default);
                }
                Some(false) => settings.ai = None,
                None => {
                    warn!(value = raw, "invalid ENABLE_AI_CACHE value, ignoring");
                }
            }
        }
        if let Some(raw) = self.env.get(CACHE_OPERATION_TTLS_VAR) {
            let ttls = parse_operation_ttls(raw)?;
            settings.operation_ttls.extend(ttls);
        }

        // Custom JSON applies last.
        let custom = self
            .env
            .get(CACHE_CUSTOM_CONFIG_VAR)
            .map(str::to_string)
            .or_else(|| self.cache_custom.clone());
        if let Some(raw) = custom {
            match serde_json::from_str::<Value>(&raw) {
                Err(err) => {
                    warn!(error = %err, "invalid cache custom config JSON, keeping preset");
                }
                Ok(value) => {
                    let result = validate_cache_custom(&value);
                    for w in &result.warnings {
                        warn!(warning = %w, "cache custom config");
                    }
                    if result.is_valid() {
                        apply_cache_custom(&mut settings, &value);
                    } else {
                        for e in &result.errors {
                            warn!(error = %e, "cache custom config rejected");
                        }
                    }
                }
            }
        }

        if settings.tls_cert_path.is_some() != settings.tls_key_path.is_some() {
            return Err(ServiceError::configuration(
                "TLS cert and key must be configured together",
            ));
        }

        Ok(settings)
    }

    fn build_health(&self) -> Result<HealthSettings, ServiceError> {
        let defaults = HealthSettings::default();
        let mut settings = defaults.clone();

        settings.default_timeout_ms =
            self.env.parsed_or("HEALTH_CHECK_TIMEOUT_MS", defaults.default_timeout_ms);
        if settings.default_timeout_ms == 0 {
            return Err(ServiceError::configuration(
                "HEALTH_CHECK_TIMEOUT_MS must be greater than zero",
            ));
        }

        if let Some(raw) = self.env.get("HEALTH_CHECK_RETRY_COUNT") {
            match raw.parse::<i64>() {
                Ok(n) if n >= 0 => settings.retry_count = n as u32,
                Ok(n) => {
                    return Err(ServiceError::configuration(
                        "HEALTH_CHECK_RETRY_COUNT must not be negative",
                    )
                    .with_context("actual", n));
                }
                Err(_) => {
                    warn!(value = raw, "invalid HEALTH_CHECK_RETRY_COUNT, using default");
                }
            }
        }

        if let Some(raw) = self.env.get("HEALTH_CHECK_BACKOFF_BASE_S") {
            match raw.parse::<f64>() {
                Ok(v) if v >= 0.0 => settings.backoff_base_s = v,
                Ok(v) => {
                    return Err(ServiceError::configuration(
                        "HEALTH_CHECK_BACKOFF_BASE_S must not be negative",
                    )
                    .with_context("actual", v));
                }
                Err(_) => {
                    warn!(value = raw, "invalid HEALTH_CHECK_BACKOFF_BASE_S, using default");
                }
            }
        }

        if let Some(raw) = self.env.get("HEALTH_CHECK_ENABLED_COMPONENTS") {
            settings.enabled_components = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        // HEALTH_CHECK_<COMPONENT>_TIMEOUT_MS overrides, component name
        // lowercased.
        for key in self.env.keys() {
            let Some(middle) =
                key.strip_prefix("HEALTH_CHECK_").and_then(|k| k.strip_suffix("_TIMEOUT_MS"))
            else {
                continue;
            };
            if middle.is_empty() {
                continue;
            }
            let component = middle.to_ascii_lowercase();
            let ms: u64 = self.env.parsed_or(key, settings.default_timeout_ms);
            if ms == 0 {
                return Err(ServiceError::configuration(
                    "per-component health timeout must be greater than zero",
                )
                .with_context("component", component));
            }
            settings.per_component_timeouts_ms.insert(component, ms);
        }

        Ok(settings)
    }
}

fn positive_or<T>(env: &EnvSource, name: &str, fallback: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default + Copy,
{
    let value: T = env.parsed_or(name, fallback);
    if value <= T::default() {
        warn!(var = name, "non-positive env value, using default");
        fallback
    } else {
        value
    }
}

fn positive_f64_or(env: &EnvSource, name: &str, fallback: f64) -> f64 {
    let value: f64 = env.parsed_or(name, fallback);
    if value <= 0.0 || !value.is_finite() {
        warn!(var = name, "non-positive env value, using default");
        fallback
    } else {
        value
    }
}

fn parse_operation_ttls(raw: &str) -> Result<BTreeMap<String, u64>, ServiceError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| {
        ServiceError::configuration("CACHE_OPERATION_TTLS is not valid JSON")
            .with_context("error", err.to_string())
    })?;
    let object = value.as_object().ok_or_else(|| {
        ServiceError::configuration("CACHE_OPERATION_TTLS must be a JSON object")
    })?;
    let mut ttls = BTreeMap::new();
    for (op, ttl) in object {
        if Operation::parse(op).is_none() {
            return Err(ServiceError::configuration("unknown operation in CACHE_OPERATION_TTLS")
                .with_context("operation", op.clone()));
        }
        let secs = ttl.as_u64().filter(|s| *s > 0).ok_or_else(|| {
            ServiceError::configuration("operation TTL must be a positive integer")
                .with_context("operation", op.clone())
        })?;
        ttls.insert(op.clone(), secs);
    }
    Ok(ttls)
}

// ---------------------------------------------------------------------------
// Custom JSON validation and application
// ---------------------------------------------------------------------------

const RESILIENCE_CUSTOM_KEYS: [&str; 11] = [
    "retry_attempts",
    "max_delay_seconds",
    "exponential_multiplier",
    "exponential_min",
    "exponential_max",
    "jitter_enabled",
    "jitter_max",
    "circuit_breaker_threshold",
    "recovery_timeout",
    "default_strategy",
    "operation_overrides",
];

/// Validate a resilience custom-config JSON string; exposed for admin
/// endpoints.
pub fn validate_resilience_custom_json(raw: &str) -> ValidationResult {
    match serde_json::from_str::<Value>(raw) {
        Err(err) => {
            let mut result = ValidationResult::default();
            result.error(format!("invalid JSON: {err}"));
            result
        }
        Ok(value) => validate_resilience_custom(&value),
    }
}

fn validate_resilience_custom(value: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let Some(object) = value.as_object() else {
        result.error("custom config must be a JSON object");
        return result;
    };

    for key in object.keys() {
        if !RESILIENCE_CUSTOM_KEYS.contains(&key.as_str()) {
            result.error(format!("unknown key '{key}'"));
        }
    }

    check_int_range(&mut result, object, "retry_attempts", 1, 20);
    check_int_range(&mut result, object, "max_delay_seconds", 1, 3600);
    check_int_range(&mut result, object, "circuit_breaker_threshold", 1, 100);
    check_int_range(&mut result, object, "recovery_timeout", 1, 3600);
    check_positive_number(&mut result, object, "exponential_multiplier");
    check_positive_number(&mut result, object, "exponential_min");
    check_positive_number(&mut result, object, "exponential_max");
    check_positive_number(&mut result, object, "jitter_max");
    check_bool(&mut result, object, "jitter_enabled");

    if let (Some(min), Some(max)) = (
        object.get("exponential_min").and_then(Value::as_f64),
        object.get("exponential_max").and_then(Value::as_f64),
    ) {
        if min > max {
            result.warning("exponential_min exceeds exponential_max; both ignored");
        }
    }

    if let Some(strategy) = object.get("default_strategy") {
        match strategy.as_str().and_then(StrategyKind::parse) {
            Some(_) => {}
            None => result.error("default_strategy must be one of aggressive, balanced, conservative, critical"),
        }
    }

    if let Some(overrides) = object.get("operation_overrides") {
        match overrides.as_object() {
            None => result.error("operation_overrides must be an object"),
            Some(map) => {
                for (op, strategy) in map {
                    if Operation::parse(op).is_none() {
                        result.error(format!("unknown operation '{op}' in operation_overrides"));
                    }
                    if strategy.as_str().and_then(StrategyKind::parse).is_none() {
                        result.error(format!("invalid strategy for operation '{op}'"));
                    }
                }
            }
        }
    }

    result
}

fn apply_resilience_custom(settings: &mut ResilienceSettings, value: &Value) {
    let Some(object) = value.as_object() else { return };

    if let Some(v) = object.get("retry_attempts").and_then(Value::as_u64) {
        settings.retry.max_attempts = v as usize;
    }
    if let Some(v) = object.get("max_delay_seconds").and_then(Value::as_u64) {
        settings.retry.max_delay_s = v;
    }
    if let Some(v) = object.get("exponential_multiplier").and_then(Value::as_f64) {
        settings.retry.exp_multiplier = v;
    }
    let min = object.get("exponential_min").and_then(Value::as_f64);
    let max = object.get("exponential_max").and_then(Value::as_f64);
    // A min above max is a conflict; both are ignored (validation warned).
    let conflicting = matches!((min, max), (Some(lo), Some(hi)) if lo > hi);
    if !conflicting {
        if let Some(v) = min {
            settings.retry.exp_min = v;
        }
        if let Some(v) = max {
            settings.retry.exp_max = v;
        }
    }
    if let Some(v) = object.get("jitter_enabled").and_then(Value::as_bool) {
        settings.retry.jitter_enabled = v;
    }
    if let Some(v) = object.get("jitter_max").and_then(Value::as_f64) {
        settings.retry.jitter_max_s = v;
    }
    if let Some(v) = object.get("circuit_breaker_threshold").and_then(Value::as_u64) {
        settings.breaker.failure_threshold = v as usize;
    }
    if let Some(v) = object.get("recovery_timeout").and_then(Value::as_u64) {
        settings.breaker.recovery_timeout_s = v;
    }
    if let Some(kind) =
        object.get("default_strategy").and_then(Value::as_str).and_then(StrategyKind::parse)
    {
        settings.default_strategy = kind;
    }
    if let Some(map) = object.get("operation_overrides").and_then(Value::as_object) {
        for (op, strategy) in map {
            if let Some(kind) = strategy.as_str().and_then(StrategyKind::parse) {
                settings.operation_strategies.insert(op.clone(), kind);
            }
        }
    }
}

const CACHE_CUSTOM_KEYS: [&str; 9] = [
    "default_ttl",
    "memory_cache_size",
    "compression_threshold",
    "compression_level",
    "text_size_tiers",
    "operation_ttls",
    "max_connections",
    "enable_ai_cache",
    "text_hash_threshold",
];

/// Validate a cache custom-config JSON string; exposed for admin endpoints.
pub fn validate_cache_custom_json(raw: &str) -> ValidationResult {
    match serde_json::from_str::<Value>(raw) {
        Err(err) => {
            let mut result = ValidationResult::default();
            result.error(format!("invalid JSON: {err}"));
            result
        }
        Ok(value) => validate_cache_custom(&value),
    }
}

fn validate_cache_custom(value: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();
    let Some(object) = value.as_object() else {
        result.error("custom config must be a JSON object");
        return result;
    };

    for key in object.keys() {
        if !CACHE_CUSTOM_KEYS.contains(&key.as_str()) {
            result.error(format!("unknown key '{key}'"));
        }
    }

    check_int_range(&mut result, object, "default_ttl", 60, 604_800);
    check_int_range(&mut result, object, "memory_cache_size", 1, 1_000_000);
    check_int_range(&mut result, object, "compression_threshold", 1, 10_000_000);
    check_int_range(&mut result, object, "compression_level", 1, 9);
    check_int_range(&mut result, object, "max_connections", 1, 1000);
    check_int_range(&mut result, object, "text_hash_threshold", 1, 1_000_000);
    check_bool(&mut result, object, "enable_ai_cache");

    if let Some(tiers) = object.get("text_size_tiers") {
        match parse_tiers(tiers) {
            Err(message) => result.error(message),
            Ok(tiers) if !tiers.is_ascending() => {
                result.warning("text_size_tiers must be strictly ascending; tiers ignored");
            }
            Ok(_) => {}
        }
    }

    if let Some(ttls) = object.get("operation_ttls") {
        match ttls.as_object() {
            None => result.error("operation_ttls must be an object"),
            Some(map) => {
                for (op, ttl) in map {
                    if Operation::parse(op).is_none() {
                        result.error(format!("unknown operation '{op}' in operation_ttls"));
                    }
                    if ttl.as_u64().filter(|s| *s > 0).is_none() {
                        result.error(format!("TTL for '{op}' must be a positive integer"));
                    }
                }
            }
        }
    }

    result
}

fn parse_tiers(value: &Value) -> Result<TextSizeTiers, String> {
    let object = value.as_object().ok_or("text_size_tiers must be an object")?;
    let mut tiers = TextSizeTiers::default();
    for (key, slot) in [
        ("small", &mut tiers.small),
        ("medium", &mut tiers.medium),
        ("large", &mut tiers.large),
    ] {
        match object.get(key) {
            None => return Err(format!("text_size_tiers missing '{key}'")),
            Some(v) => match v.as_u64().filter(|n| *n > 0) {
                Some(n) => *slot = n as usize,
                None => return Err(format!("text_size_tiers '{key}' must be a positive integer")),
            },
        }
    }
    for key in object.keys() {
        if !["small", "medium", "large"].contains(&key.as_str()) {
            return Err(format!("unknown tier '{key}' in text_size_tiers"));
        }
    }
    Ok(tiers)
}

fn apply_cache_custom(settings: &mut CacheSettings, value: &Value) {
    let Some(object) = value.as_object() else { return };

    if let Some(v) = object.get("default_ttl").and_then(Value::as_u64) {
        settings.default_ttl_s = v;
    }
    if let Some(v) = object.get("memory_cache_size").and_then(Value::as_u64) {
        settings.memory_cache_size = v as usize;
    }
    if let Some(v) = object.get("compression_threshold").and_then(Value::as_u64) {
        settings.compression_threshold_bytes = v as usize;
    }
    if let Some(v) = object.get("compression_level").and_then(Value::as_u64) {
        settings.compression_level = v as u32;
    }
    if let Some(v) = object.get("max_connections").and_then(Value::as_u64) {
        settings.max_connections = v as u32;
    }
    if let Some(tiers) = object.get("text_size_tiers") {
        if let Ok(parsed) = parse_tiers(tiers) {
            if parsed.is_ascending() {
                settings.text_size_tiers = parsed;
            }
        }
    }
    if let Some(map) = object.get("operation_ttls").and_then(Value::as_object) {
        for (op, ttl) in map {
            if let Some(secs) = ttl.as_u64() {
                settings.operation_ttls.insert(op.clone(), secs);
            }
        }
    }
    if let Some(enabled) = object.get("enable_ai_cache").and_then(Value::as_bool) {
        if enabled {
            settings.ai.get_or_insert_with(AiCacheTuning::default);
        } else {
            settings.ai = None;
        }
    }
    if let Some(v) = object.get("text_hash_threshold").and_then(Value::as_u64) {
        let ai = settings.ai.get_or_insert_with(AiCacheTuning::default);
        ai.text_hash_threshold = v as usize;
    }
}

fn check_int_range(
    result: &mut ValidationResult,
    object: &serde_json::Map<String, Value>,
    key: &str,
    min: u64,
    max: u64,
) {
    if let Some(value) = object.get(key) {
        match value.as_u64() {
            Some(n) if (min..=max).contains(&n) => {}
            _ => result.error(format!("{key} must be an integer in [{min}, {max}]")),
        }
    }
}

fn check_positive_number(
    result: &mut ValidationResult,
    object: &serde_json::Map<String, Value>,
    key: &str,
) {
    if let Some(value) = object.get(key) {
        match value.as_f64() {
            Some(n) if n > 0.0 && n.is_finite() => {}
            _ => result.error(format!("{key} must be a positive number")),
        }
    }
}

fn check_bool(result: &mut ValidationResult, object: &serde_json::Map<String, Value>, key: &str) {
    if let Some(value) = object.get(key) {
        if !value.is_boolean() {
            result.error(format!("{key} must be a boolean"));
        }
    }
}
