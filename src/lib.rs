#![forbid(unsafe_code)]

//! # textforge
//!
//! Coordination core for an AI-assisted text-processing service. A client
//! submits a text plus an operation (summarize, sentiment, key points,
//! questions, QA) and receives a structured result; this crate is
//! everything between the public API and the upstream generative model:
//!
//! - **Config resolver**: presets, legacy env vars, and JSON overrides
//!   folded into one immutable [`RuntimeConfig`]
//! - **Resilience orchestrator**: retry with backoff and jitter, circuit
//!   breakers partitioned per operation, per-attempt timeouts
//! - **Tiered response cache**: in-process LRU over an optional Redis
//!   backend, with tier-aware keys, compression, and per-operation TTLs
//! - **Text processor**: the per-request pipeline with sanitization,
//!   response validation, and graceful fallback
//! - **Health aggregator**: concurrent component probes with worst-case
//!   roll-up
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use textforge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServiceError> {
//!     let config = Arc::new(
//!         ConfigBuilder::new(EnvSource::default())
//!             .resilience_preset("simple")
//!             .cache_preset("development")
//!             .build()?,
//!     );
//!     let cache = Arc::new(AiResponseCache::with_backend(
//!         config.cache.clone(),
//!         Arc::new(MemoryBackend::new()),
//!     ));
//!     let resilience = Arc::new(Resilience::new(config.resilience.clone()));
//!     let model: Arc<dyn TextModel> = Arc::new(StaticModel::new("A concise summary."));
//!     let processor = TextProcessor::new(config, model, cache, resilience);
//!
//!     let request =
//!         TextProcessingRequest::new("A document worth summarizing.", Operation::Summarize);
//!     let response = processor.process(request).await?;
//!     assert!(response.success);
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod health;
pub mod jitter;
pub mod model;
pub mod presets;
pub mod processor;
pub mod prompt;
pub mod resilience;
pub mod sanitizer;
pub mod service;
pub mod sleeper;
pub mod validator;

// Re-exports
pub use backoff::ExponentialBackoff;
pub use cache::backend::{BackendError, BackendInfo, KvBackend, MemoryBackend, RedisBackend};
pub use cache::key::{CacheKey, KeyGenerator, TextTier};
pub use cache::stats::CacheStatsReport;
pub use cache::{AiResponseCache, CachedEntry};
pub use circuit_breaker::{BreakerRegistry, CircuitBreaker, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    AiConfig, CacheSettings, ConfigBuilder, ConfigHandle, EnvSource, HealthSettings,
    ResilienceSettings, RuntimeConfig, SecuritySettings, ValidationResult,
};
pub use domain::{
    BatchItem, BatchProcessingRequest, BatchProcessingResponse, Operation, ProcessingOptions,
    SentimentResult, TextProcessingRequest, TextProcessingResponse,
};
pub use error::{ErrorKind, ServiceError};
pub use health::{ComponentStatus, HealthChecker, HealthStatus, SystemHealthStatus};
pub use jitter::Jitter;
pub use model::{ScriptedModel, StaticModel, TextModel};
pub use presets::{StrategyKind, StrategyParams};
pub use processor::TextProcessor;
pub use resilience::Resilience;
pub use sanitizer::PromptSanitizer;
pub use service::ServiceCore;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use validator::{OperationOutput, ResponseValidator};

pub mod prelude;
