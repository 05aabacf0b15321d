#![allow(dead_code)]

//! Shared harness for the integration suites: an in-memory L2 backend, a
//! manual breaker clock, and an instant sleeper so every flow runs
//! deterministically without Redis or a model provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use textforge::prelude::*;
use textforge::{ManualClock, MemoryBackend};

pub fn config_from(pairs: &[(&str, &str)]) -> Arc<RuntimeConfig> {
    let vars: BTreeMap<String, String> =
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    Arc::new(
        ConfigBuilder::new(EnvSource::from_map(vars)).build().expect("test config builds"),
    )
}

pub struct CoreHarness {
    pub config: Arc<RuntimeConfig>,
    pub processor: TextProcessor,
    pub cache: Arc<AiResponseCache>,
    pub resilience: Arc<Resilience>,
    pub backend: MemoryBackend,
    pub clock: ManualClock,
}

/// Full core wired against fakes. `pairs` become environment variables for
/// the config resolver.
pub fn core(model: Arc<dyn TextModel>, pairs: &[(&str, &str)]) -> CoreHarness {
    let config = config_from(pairs);
    let backend = MemoryBackend::new();
    let cache = Arc::new(AiResponseCache::with_backend(
        config.cache.clone(),
        Arc::new(backend.clone()),
    ));
    let clock = ManualClock::new();
    let resilience = Arc::new(
        Resilience::new(config.resilience.clone())
            .with_sleeper(Arc::new(InstantSleeper))
            .with_clock(Arc::new(clock.clone())),
    );
    let processor =
        TextProcessor::new(config.clone(), model, cache.clone(), resilience.clone());
    CoreHarness { config, processor, cache, resilience, backend, clock }
}

pub fn summarize_request(text: &str) -> TextProcessingRequest {
    TextProcessingRequest::new(text, Operation::Summarize).with_options(ProcessingOptions {
        max_length: Some(30),
        ..Default::default()
    })
}
