//! Named configuration presets.
//!
//! Presets bundle resilience or cache parameters for a deployment
//! environment so operators pick one name instead of a dozen knobs. The
//! config resolver uses these as the base layer before env and JSON
//! overrides are applied.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{
    AiCacheTuning, BreakerTuning, HashAlgorithm, RetryTuning, TextSizeTiers,
};
use crate::domain::Operation;

/// Resilience strategy tag applied per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Aggressive,
    Balanced,
    Conservative,
    Critical,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Aggressive,
        StrategyKind::Balanced,
        StrategyKind::Conservative,
        StrategyKind::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Aggressive => "aggressive",
            StrategyKind::Balanced => "balanced",
            StrategyKind::Conservative => "conservative",
            StrategyKind::Critical => "critical",
        }
    }

    pub fn parse(name: &str) -> Option<StrategyKind> {
        match name {
            "aggressive" => Some(StrategyKind::Aggressive),
            "balanced" => Some(StrategyKind::Balanced),
            "conservative" => Some(StrategyKind::Conservative),
            "critical" => Some(StrategyKind::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete parameters a strategy tag resolves to at config-build time.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub retry: RetryTuning,
    pub breaker: BreakerTuning,
    /// Budget for a single attempt inside the orchestrator.
    pub attempt_timeout: Duration,
}

impl StrategyParams {
    /// Built-in parameter bundle for a strategy tag.
    pub fn for_kind(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Aggressive => Self {
                retry: RetryTuning {
                    max_attempts: 2,
                    max_delay_s: 10,
                    exp_min: 1.0,
                    exp_max: 5.0,
                    exp_multiplier: 1.0,
                    jitter_enabled: true,
                    jitter_max_s: 1.0,
                },
                breaker: BreakerTuning {
                    failure_threshold: 3,
                    recovery_timeout_s: 30,
                    half_open_max_calls: 2,
                },
                attempt_timeout: Duration::from_secs(10),
            },
            StrategyKind::Balanced => Self {
                retry: RetryTuning {
                    max_attempts: 3,
                    max_delay_s: 30,
                    exp_min: 2.0,
                    exp_max: 10.0,
                    exp_multiplier: 1.0,
                    jitter_enabled: true,
                    jitter_max_s: 2.0,
                },
                breaker: BreakerTuning {
                    failure_threshold: 5,
                    recovery_timeout_s: 60,
                    half_open_max_calls: 2,
                },
                attempt_timeout: Duration::from_secs(20),
            },
            StrategyKind::Conservative => Self {
                retry: RetryTuning {
                    max_attempts: 5,
                    max_delay_s: 60,
                    exp_min: 4.0,
                    exp_max: 30.0,
                    exp_multiplier: 1.5,
                    jitter_enabled: true,
                    jitter_max_s: 3.0,
                },
                breaker: BreakerTuning {
                    failure_threshold: 8,
                    recovery_timeout_s: 120,
                    half_open_max_calls: 3,
                },
                attempt_timeout: Duration::from_secs(45),
            },
            StrategyKind::Critical => Self {
                retry: RetryTuning {
                    max_attempts: 7,
                    max_delay_s: 120,
                    exp_min: 3.0,
                    exp_max: 60.0,
                    exp_multiplier: 2.0,
                    jitter_enabled: true,
                    jitter_max_s: 5.0,
                },
                breaker: BreakerTuning {
                    failure_threshold: 10,
                    recovery_timeout_s: 300,
                    half_open_max_calls: 3,
                },
                attempt_timeout: Duration::from_secs(90),
            },
        }
    }
}

/// Built-in per-operation strategy defaults, used when neither preset nor
/// overrides say otherwise.
pub fn default_operation_strategy(operation: Operation) -> StrategyKind {
    match operation {
        Operation::Summarize => StrategyKind::Balanced,
        Operation::Sentiment => StrategyKind::Aggressive,
        Operation::KeyPoints => StrategyKind::Balanced,
        Operation::Questions => StrategyKind::Balanced,
        Operation::Qa => StrategyKind::Conservative,
    }
}

/// A named resilience parameter bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePreset {
    pub name: &'static str,
    pub default_strategy: StrategyKind,
    pub retry: RetryTuning,
    pub breaker: BreakerTuning,
    pub operation_overrides: BTreeMap<String, StrategyKind>,
}

pub const RESILIENCE_PRESET_NAMES: [&str; 3] = ["simple", "development", "production"];

/// Look up a resilience preset by name.
pub fn resilience_preset(name: &str) -> Option<ResiliencePreset> {
    let preset = match name {
        "simple" => ResiliencePreset {
            name: "simple",
            default_strategy: StrategyKind::Balanced,
            retry: RetryTuning {
                max_attempts: 3,
                max_delay_s: 30,
                exp_min: 2.0,
                exp_max: 10.0,
                exp_multiplier: 1.0,
                jitter_enabled: true,
                jitter_max_s: 2.0,
            },
            breaker: BreakerTuning {
                failure_threshold: 5,
                recovery_timeout_s: 60,
                half_open_max_calls: 2,
            },
            operation_overrides: BTreeMap::new(),
        },
        "development" => ResiliencePreset {
            name: "development",
            default_strategy: StrategyKind::Aggressive,
            retry: RetryTuning {
                max_attempts: 2,
                max_delay_s: 10,
                exp_min: 1.0,
                exp_max: 5.0,
                exp_multiplier: 1.0,
                jitter_enabled: true,
                jitter_max_s: 1.0,
            },
            breaker: BreakerTuning {
                failure_threshold: 3,
                recovery_timeout_s: 30,
                half_open_max_calls: 2,
            },
            operation_overrides: [
                ("sentiment".to_string(), StrategyKind::Aggressive),
                ("qa".to_string(), StrategyKind::Balanced),
            ]
            .into(),
        },
        "production" => ResiliencePreset {
            name: "production",
            default_strategy: StrategyKind::Conservative,
            retry: RetryTuning {
                max_attempts: 5,
                max_delay_s: 60,
                exp_min: 4.0,
                exp_max: 30.0,
                exp_multiplier: 1.5,
                jitter_enabled: true,
                jitter_max_s: 3.0,
            },
            breaker: BreakerTuning {
                failure_threshold: 10,
                recovery_timeout_s: 120,
                half_open_max_calls: 3,
            },
            operation_overrides: [
                ("qa".to_string(), StrategyKind::Critical),
                ("sentiment".to_string(), StrategyKind::Aggressive),
                ("summarize".to_string(), StrategyKind::Conservative),
            ]
            .into(),
        },
        _ => return None,
    };
    Some(preset)
}

/// A named cache parameter bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct CachePreset {
    pub name: &'static str,
    /// `false` turns the whole cache into a no-op.
    pub enabled: bool,
    pub default_ttl_s: u64,
    pub memory_cache_size: usize,
    pub max_connections: u32,
    pub compression_threshold_bytes: usize,
    pub compression_level: u32,
    pub text_size_tiers: TextSizeTiers,
    pub operation_ttls: BTreeMap<String, u64>,
    pub ai: Option<AiCacheTuning>,
}

pub const CACHE_PRESET_NAMES: [&str; 7] = [
    "disabled",
    "minimal",
    "simple",
    "development",
    "production",
    "ai-development",
    "ai-production",
];

fn default_operation_ttls() -> BTreeMap<String, u64> {
    [
        ("summarize".to_string(), 7200),
        ("sentiment".to_string(), 3600),
        ("key_points".to_string(), 5400),
        ("questions".to_string(), 4800),
        ("qa".to_string(), 3600),
    ]
    .into()
}

/// Look up a cache preset by name.
pub fn cache_preset(name: &str) -> Option<CachePreset> {
    let tiers = TextSizeTiers::default();
    let preset = match name {
        "disabled" => CachePreset {
            name: "disabled",
            enabled: false,
            default_ttl_s: 300,
            memory_cache_size: 10,
            max_connections: 1,
            compression_threshold_bytes: 1000,
            compression_level: 6,
            text_size_tiers: tiers,
            operation_ttls: BTreeMap::new(),
            ai: None,
        },
        "minimal" => CachePreset {
            name: "minimal",
            enabled: true,
            default_ttl_s: 900,
            memory_cache_size: 25,
            max_connections: 1,
            compression_threshold_bytes: 5000,
            compression_level: 1,
            text_size_tiers: tiers,
            operation_ttls: BTreeMap::new(),
            ai: None,
        },
        "simple" => CachePreset {
            name: "simple",
            enabled: true,
            default_ttl_s: 3600,
            memory_cache_size: 100,
            max_connections: 5,
            compression_threshold_bytes: 1000,
            compression_level: 6,
            text_size_tiers: tiers,
            operation_ttls: default_operation_ttls(),
            ai: None,
        },
        "development" => CachePreset {
            name: "development",
            enabled: true,
            default_ttl_s: 600,
            memory_cache_size: 100,
            max_connections: 3,
            compression_threshold_bytes: 2000,
            compression_level: 4,
            text_size_tiers: tiers,
            operation_ttls: default_operation_ttls(),
            ai: None,
        },
        "production" => CachePreset {
            name: "production",
            enabled: true,
            default_ttl_s: 7200,
            memory_cache_size: 500,
            max_connections: 20,
            compression_threshold_bytes: 1000,
            compression_level: 6,
            text_size_tiers: tiers,
            operation_ttls: default_operation_ttls(),
            ai: None,
        },
        "ai-development" => CachePreset {
            name: "ai-development",
            enabled: true,
            default_ttl_s: 600,
            memory_cache_size: 200,
            max_connections: 3,
            compression_threshold_bytes: 2000,
            compression_level: 4,
            text_size_tiers: tiers,
            operation_ttls: default_operation_ttls(),
            ai: Some(AiCacheTuning {
                text_hash_threshold: 500,
                hash_algorithm: HashAlgorithm::Sha256,
                enable_smart_promotion: true,
                max_text_length: 50_000,
            }),
        },
        "ai-production" => CachePreset {
            name: "ai-production",
            enabled: true,
            default_ttl_s: 7200,
            memory_cache_size: 1000,
            max_connections: 25,
            compression_threshold_bytes: 1000,
            compression_level: 6,
            text_size_tiers: tiers,
            operation_ttls: default_operation_ttls(),
            ai: Some(AiCacheTuning {
                text_hash_threshold: 1000,
                hash_algorithm: HashAlgorithm::Sha256,
                enable_smart_promotion: true,
                max_text_length: 100_000,
            }),
        },
        _ => return None,
    };
    Some(preset)
}
