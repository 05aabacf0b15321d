//! Startup wiring for the core.
//!
//! Builds the cache, resilience handle, processor, and health checker from
//! one `RuntimeConfig` and registers the standard component probes. The
//! transport layer holds a `ServiceCore` and nothing else.

use std::sync::Arc;

use crate::cache::backend::KvBackend;
use crate::cache::AiResponseCache;
use crate::config::RuntimeConfig;
use crate::error::ServiceError;
use crate::health::{ComponentStatus, HealthChecker};
use crate::model::TextModel;
use crate::processor::TextProcessor;
use crate::resilience::Resilience;

/// The assembled core: one of everything, ready for the transport layer.
#[derive(Debug)]
pub struct ServiceCore {
    pub config: Arc<RuntimeConfig>,
    pub cache: Arc<AiResponseCache>,
    pub resilience: Arc<Resilience>,
    pub processor: Arc<TextProcessor>,
    pub health: Arc<HealthChecker>,
}

impl ServiceCore {
    /// Wire the core against the configured Redis backend. An unreachable
    /// backend degrades the cache rather than failing startup.
    ///
    /// # Errors
    ///
    /// Probe registration fails only on an empty component name, which the
    /// config resolver already prevents.
    pub async fn initialize(
        config: RuntimeConfig,
        model: Arc<dyn TextModel>,
    ) -> Result<Self, ServiceError> {
        let cache = Arc::new(AiResponseCache::connect(config.cache.clone()).await);
        Self::assemble(config, model, cache)
    }

    /// Wire the core over an explicit L2 backend; used by tests and
    /// embedders that bring their own store.
    pub fn initialize_with_backend(
        config: RuntimeConfig,
        model: Arc<dyn TextModel>,
        backend: Arc<dyn KvBackend>,
    ) -> Result<Self, ServiceError> {
        let cache = Arc::new(AiResponseCache::with_backend(config.cache.clone(), backend));
        Self::assemble(config, model, cache)
    }

    fn assemble(
        config: RuntimeConfig,
        model: Arc<dyn TextModel>,
        cache: Arc<AiResponseCache>,
    ) -> Result<Self, ServiceError> {
        let config = Arc::new(config);
        let resilience = Arc::new(Resilience::new(config.resilience.clone()));
        let processor = Arc::new(TextProcessor::new(
            config.clone(),
            model.clone(),
            cache.clone(),
            resilience.clone(),
        ));
        let health = Arc::new(HealthChecker::new(config.health.clone()));

        for component in &config.health.enabled_components {
            match component.as_str() {
                "ai_model" => {
                    let model = model.clone();
                    let name = config.ai.model.clone();
                    health.register("ai_model", move || {
                        let model = model.clone();
                        let name = name.clone();
                        async move {
                            model.healthcheck().await?;
                            Ok(ComponentStatus::healthy("ai_model")
                                .with_metadata("model", name))
                        }
                    })?;
                }
                "cache" => {
                    let cache = cache.clone();
                    health.register("cache", move || {
                        let cache = cache.clone();
                        async move {
                            cache.ping().await?;
                            let stats = cache.stats().await;
                            Ok(ComponentStatus::healthy("cache")
                                .with_metadata("l1_entries", stats.l1.entries)
                                .with_metadata("l2_connected", stats.l2.connected))
                        }
                    })?;
                }
                "resilience" => {
                    let resilience = resilience.clone();
                    health.register("resilience", move || {
                        let resilience = resilience.clone();
                        async move {
                            let open = resilience.open_breaker_count();
                            if open == 0 {
                                Ok(ComponentStatus::healthy("resilience"))
                            } else {
                                Ok(ComponentStatus::degraded(
                                    "resilience",
                                    format!("{open} circuit breaker(s) open"),
                                )
                                .with_metadata("open_breakers", open))
                            }
                        }
                    })?;
                }
                other => {
                    tracing::warn!(component = other, "no built-in probe for component");
                }
            }
        }

        Ok(Self { config, cache, resilience, processor, health })
    }
}
