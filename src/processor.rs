//! End-to-end text-processing pipeline.
//!
//! One linear path per request: validate, sanitize, key, cache lookup,
//! resilience-wrapped model call, response validation, cache store. When
//! the model is unavailable the pipeline degrades to a cached older value
//! or an operation-shaped default instead of failing the request.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::cache::key::CacheKey;
use crate::cache::AiResponseCache;
use crate::config::{RuntimeConfig, FALLBACK_TTL};
use crate::domain::{
    word_count, BatchItem, BatchProcessingRequest, BatchProcessingResponse, Operation,
    SentimentResult, TextProcessingRequest, TextProcessingResponse,
};
use crate::error::{ErrorKind, ServiceError};
use crate::model::TextModel;
use crate::prompt::build_prompt;
use crate::resilience::Resilience;
use crate::sanitizer::PromptSanitizer;
use crate::validator::{OperationOutput, ResponseValidator};

/// Fixed message returned for summarize/qa when the service is degraded.
pub const UNAVAILABLE_MESSAGE: &str =
    "The AI service is temporarily unavailable. Please try again later.";

const SENTIMENT_UNAVAILABLE_EXPLANATION: &str =
    "Sentiment analysis is temporarily unavailable.";

/// Generic follow-up questions served when question generation is degraded.
pub const FALLBACK_QUESTIONS: [&str; 2] =
    ["What is the main topic of this text?", "What are the most important details?"];

/// The per-request pipeline. Shares the model, cache, and resilience
/// handles; construct once and call from as many tasks as needed.
#[derive(Debug)]
pub struct TextProcessor {
    config: Arc<RuntimeConfig>,
    model: Arc<dyn TextModel>,
    cache: Arc<AiResponseCache>,
    resilience: Arc<Resilience>,
    sanitizer: PromptSanitizer,
    validator: ResponseValidator,
}

impl TextProcessor {
    pub fn new(
        config: Arc<RuntimeConfig>,
        model: Arc<dyn TextModel>,
        cache: Arc<AiResponseCache>,
        resilience: Arc<Resilience>,
    ) -> Self {
        let sanitizer = PromptSanitizer::new(config.cache.max_text_length());
        Self {
            config,
            model,
            cache,
            resilience,
            sanitizer,
            validator: ResponseValidator::new(),
        }
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    ///
    /// Validation failures and permanent model errors propagate; transient
    /// exhaustion and open circuits degrade to a fallback response instead.
    pub async fn process(
        &self,
        request: TextProcessingRequest,
    ) -> Result<TextProcessingResponse, ServiceError> {
        let started = Instant::now();
        request.validate(self.config.cache.max_text_length())?;

        let operation = request.operation;
        let text = self.sanitizer.clean(&request.text);
        let question = request.question.as_deref();
        let key = self.cache.key_for(&text, operation, &request.options, question);

        if let Some(mut cached) = self.cache.get(&key).await {
            cached.cache_hit = true;
            cached.processing_time_ms = elapsed_ms(started);
            return Ok(cached);
        }

        let prompt = build_prompt(operation, &text, &request.options, question);
        let model = self.model.clone();
        let generated = self
            .resilience
            .run(operation.as_str(), || {
                let model = model.clone();
                let prompt = prompt.clone();
                async move { model.generate(&prompt).await }
            })
            .await;

        match generated {
            Ok(raw) => {
                let output = self.validator.validate(&raw, operation)?;
                let mut response = response_from_output(operation, output);
                response.processing_time_ms = elapsed_ms(started);
                response.set_meta("service_status", "normal");
                response.set_meta("fallback_used", false);
                response.set_meta("word_count", word_count(&text));
                self.cache.set(&key, &response, operation).await;
                Ok(response)
            }
            Err(error) if is_availability_failure(&error) => {
                let mut response = self.fallback(&key, operation, &text, &error).await;
                response.processing_time_ms = elapsed_ms(started);
                Ok(response)
            }
            Err(error) => Err(error),
        }
    }

    /// Process a batch of independent requests under the configured
    /// concurrency limit. Items fail in isolation; the batch only errors on
    /// structural problems (empty, or over the per-call limit).
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` for an empty batch,
    /// `ServiceError::BusinessLogic` when the batch exceeds
    /// `ai.max_batch_requests_per_call`.
    pub async fn process_batch(
        &self,
        batch: BatchProcessingRequest,
    ) -> Result<BatchProcessingResponse, ServiceError> {
        let started = Instant::now();
        if batch.requests.is_empty() {
            return Err(ServiceError::validation("batch must contain at least one request"));
        }
        let limit = self.config.ai.max_batch_requests_per_call as usize;
        if batch.requests.len() > limit {
            return Err(ServiceError::business_logic("batch exceeds the per-call request limit")
                .with_context("actual", batch.requests.len())
                .with_context("expected_max", limit));
        }

        let concurrency = (self.config.ai.batch_concurrency_limit as usize).max(1);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency));
        let total_requests = batch.requests.len();

        let items = batch.requests.into_iter().enumerate().map(|(index, request)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit =
                    semaphore.acquire().await.expect("batch semaphore is never closed");
                match self.process(request).await {
                    Ok(response) => BatchItem {
                        index,
                        success: true,
                        response: Some(response),
                        error: None,
                    },
                    Err(error) => {
                        warn!(index, %error, "batch item failed");
                        BatchItem {
                            index,
                            success: false,
                            response: None,
                            error: Some(error.to_string()),
                        }
                    }
                }
            }
        });
        let results = futures::future::join_all(items).await;
        let completed = results.iter().filter(|item| item.success).count();

        Ok(BatchProcessingResponse {
            batch_id: batch.batch_id,
            total_requests,
            completed,
            failed: total_requests - completed,
            results,
            total_processing_time_ms: elapsed_ms(started),
        })
    }

    /// Degraded path: prefer an older cached value, else a fixed
    /// operation-shaped default. The default is cached briefly so repeated
    /// degraded requests stop hammering the cache-miss path.
    async fn fallback(
        &self,
        key: &CacheKey,
        operation: Operation,
        text: &str,
        cause: &ServiceError,
    ) -> TextProcessingResponse {
        if let Some(mut cached) = self.cache.get(key).await {
            warn!(
                operation = operation.as_str(),
                source = "cache",
                cause = %cause,
                "serving degraded response"
            );
            cached.cache_hit = true;
            cached.set_meta("service_status", "degraded");
            cached.set_meta("fallback_used", true);
            return cached;
        }

        warn!(
            operation = operation.as_str(),
            source = "default",
            cause = %cause,
            "serving degraded response"
        );
        let mut response = default_fallback(operation);
        response.set_meta("service_status", "degraded");
        response.set_meta("fallback_used", true);
        response.set_meta("word_count", word_count(text));
        self.cache.set_with_ttl(key, &response, FALLBACK_TTL).await;
        response
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Availability-class failures degrade; everything else propagates.
fn is_availability_failure(error: &ServiceError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ServiceUnavailable
            | ErrorKind::TransientInfrastructure
            | ErrorKind::RateLimit
    )
}

fn response_from_output(
    operation: Operation,
    output: OperationOutput,
) -> TextProcessingResponse {
    let mut response = TextProcessingResponse::new(operation);
    match output {
        OperationOutput::Text(text) => response.result = Some(text),
        OperationOutput::Sentiment(sentiment) => response.sentiment = Some(sentiment),
        OperationOutput::Items(items) => match operation {
            Operation::Questions => response.questions = Some(items),
            _ => response.key_points = Some(items),
        },
    }
    response
}

/// Fixed fallback shaped for the operation.
fn default_fallback(operation: Operation) -> TextProcessingResponse {
    let mut response = TextProcessingResponse::new(operation);
    match operation {
        Operation::Summarize | Operation::Qa => {
            response.result = Some(UNAVAILABLE_MESSAGE.to_string());
        }
        Operation::Sentiment => {
            response.sentiment = Some(SentimentResult {
                label: "neutral".to_string(),
                confidence: 0.0,
                explanation: SENTIMENT_UNAVAILABLE_EXPLANATION.to_string(),
            });
        }
        Operation::KeyPoints => response.key_points = Some(Vec::new()),
        Operation::Questions => {
            response.questions =
                Some(FALLBACK_QUESTIONS.iter().map(|q| q.to_string()).collect());
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::config::{ConfigBuilder, EnvSource};
    use crate::domain::ProcessingOptions;
    use crate::model::{ScriptedModel, StaticModel};
    use crate::sleeper::InstantSleeper;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(pairs: &[(&str, &str)]) -> Arc<RuntimeConfig> {
        let mut vars: BTreeMap<String, String> = BTreeMap::from([
            ("RESILIENCE_PRESET".to_string(), "simple".to_string()),
            ("CACHE_PRESET".to_string(), "development".to_string()),
        ]);
        for (k, v) in pairs {
            vars.insert(k.to_string(), v.to_string());
        }
        Arc::new(ConfigBuilder::new(EnvSource::from_map(vars)).build().unwrap())
    }

    struct Harness {
        processor: TextProcessor,
        cache: Arc<AiResponseCache>,
        clock: ManualClock,
    }

    fn harness(model: Arc<dyn TextModel>, pairs: &[(&str, &str)]) -> Harness {
        let config = config(pairs);
        let cache = Arc::new(AiResponseCache::with_backend(
            config.cache.clone(),
            Arc::new(MemoryBackend::new()),
        ));
        let clock = ManualClock::new();
        let resilience = Arc::new(
            Resilience::new(config.resilience.clone())
                .with_sleeper(Arc::new(InstantSleeper))
                .with_clock(Arc::new(clock.clone())),
        );
        Harness {
            processor: TextProcessor::new(config, model, cache.clone(), resilience),
            cache,
            clock,
        }
    }

    fn summarize_request() -> TextProcessingRequest {
        TextProcessingRequest::new("This is a document.", Operation::Summarize)
            .with_options(ProcessingOptions { max_length: Some(30), ..Default::default() })
    }

    #[tokio::test]
    async fn summarize_miss_then_hit() {
        let model = Arc::new(StaticModel::new("A short summary."));
        let h = harness(model.clone(), &[]);

        let first = h.processor.process(summarize_request()).await.unwrap();
        assert!(first.success);
        assert!(!first.cache_hit);
        assert_eq!(first.result.as_deref(), Some("A short summary."));
        assert_eq!(first.service_status(), Some("normal"));

        let second = h.processor.process(summarize_request()).await.unwrap();
        assert!(second.success);
        assert!(second.cache_hit);
        assert_eq!(second.result, first.result);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn qa_without_question_is_rejected() {
        let h = harness(Arc::new(StaticModel::new("answer")), &[]);
        let err = h
            .processor
            .process(TextProcessingRequest::new("X", Operation::Qa))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("question"));
        assert!(msg.contains("required"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let h = harness(Arc::new(StaticModel::new("x")), &[]);
        let err = h
            .processor
            .process(TextProcessingRequest::new("   ", Operation::Summarize))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn sentiment_falls_back_after_exhausted_retries() {
        let model = Arc::new(ScriptedModel::always_transient("model down"));
        // Simple preset: balanced strategy, 3 attempts.
        let h = harness(model.clone(), &[]);

        let response = h
            .processor
            .process(TextProcessingRequest::new("Some text.", Operation::Sentiment))
            .await
            .unwrap();

        assert!(response.success);
        let sentiment = response.sentiment.as_ref().expect("fallback sentiment");
        assert_eq!(sentiment.label, "neutral");
        assert_eq!(sentiment.confidence, 0.0);
        assert!(sentiment.explanation.to_lowercase().contains("unavailable"));
        assert_eq!(response.service_status(), Some("degraded"));
        assert!(response.fallback_used());
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_then_recovers() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(ServiceError::transient("down")),
            Err(ServiceError::transient("down")),
            Err(ServiceError::transient("down")),
            Ok("A fine summary.".to_string()),
        ]));
        // Threshold 3 with a single attempt per call opens on the third call.
        let h = harness(
            model.clone(),
            &[(
                "RESILIENCE_CUSTOM_CONFIG",
                r#"{"retry_attempts": 1, "circuit_breaker_threshold": 3}"#,
            )],
        );

        for _ in 0..3 {
            let response = h.processor.process(summarize_request()).await.unwrap();
            assert_eq!(response.service_status(), Some("degraded"));
            // Flush the cached fallback so the next request reaches the
            // resilience layer instead of the cache.
            h.cache.clear_all("test").await;
        }
        assert_eq!(model.calls(), 3);

        // Circuit is open: the model is healthy now but must not be invoked.
        let degraded = h.processor.process(summarize_request()).await.unwrap();
        assert!(degraded.fallback_used());
        assert_eq!(model.calls(), 3);

        // After the recovery window the half-open probe reaches the model.
        h.clock.advance_secs(60);
        h.cache.clear_all("test").await;
        let recovered = h.processor.process(summarize_request()).await.unwrap();
        assert_eq!(recovered.result.as_deref(), Some("A fine summary."));
        assert_eq!(recovered.service_status(), Some("normal"));
        assert_eq!(model.calls(), 4);
    }

    /// Model fake simulating a concurrent request that lands a cache write
    /// between this request's initial miss and its fallback lookup.
    #[derive(Debug)]
    struct WriteThenFailModel {
        cache: Arc<AiResponseCache>,
        key: CacheKey,
    }

    #[async_trait::async_trait]
    impl TextModel for WriteThenFailModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            let mut response = TextProcessingResponse::new(Operation::Summarize);
            response.result = Some("Older cached summary.".to_string());
            response.set_meta("service_status", "normal");
            self.cache.set(&self.key, &response, Operation::Summarize).await;
            Err(ServiceError::transient("down"))
        }
    }

    #[tokio::test]
    async fn fallback_prefers_older_cached_value() {
        let config = config(&[]);
        let cache = Arc::new(AiResponseCache::with_backend(
            config.cache.clone(),
            Arc::new(MemoryBackend::new()),
        ));
        let request = summarize_request();
        let key = cache.key_for(
            &request.text,
            request.operation,
            &request.options,
            None,
        );
        let model = Arc::new(WriteThenFailModel { cache: cache.clone(), key });
        let resilience = Arc::new(
            Resilience::new(config.resilience.clone()).with_sleeper(Arc::new(InstantSleeper)),
        );
        let processor = TextProcessor::new(config, model, cache, resilience);

        let degraded = processor.process(request).await.unwrap();
        assert!(degraded.fallback_used());
        assert_eq!(degraded.service_status(), Some("degraded"));
        // The fallback served the concurrently cached value, not the fixed
        // default message.
        assert_eq!(degraded.result.as_deref(), Some("Older cached summary."));
        assert!(degraded.cache_hit);
    }

    #[tokio::test]
    async fn degraded_default_when_no_cached_value() {
        let model = Arc::new(ScriptedModel::always_transient("down"));
        let h = harness(model, &[]);
        let degraded = h.processor.process(summarize_request()).await.unwrap();
        assert!(degraded.fallback_used());
        assert_eq!(degraded.result.as_deref(), Some(UNAVAILABLE_MESSAGE));
    }

    #[tokio::test]
    async fn fallback_is_cached_with_short_ttl() {
        let model = Arc::new(ScriptedModel::always_transient("down"));
        let h = harness(model.clone(), &[]);

        let first = h.processor.process(summarize_request()).await.unwrap();
        assert!(first.fallback_used());
        let calls_after_first = model.calls();

        // The cached fallback now satisfies the lookup without touching the
        // model again.
        let second = h.processor.process(summarize_request()).await.unwrap();
        assert!(second.cache_hit);
        assert!(second.fallback_used());
        assert_eq!(model.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn permanent_errors_propagate_without_fallback() {
        let model = Arc::new(ScriptedModel::new(vec![Err(ServiceError::permanent(
            "malformed request",
        ))]));
        let h = harness(model, &[]);

        let err = h.processor.process(summarize_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermanentInfrastructure { .. }));
    }

    #[tokio::test]
    async fn failed_validation_is_not_cached() {
        let model = Arc::new(ScriptedModel::new(vec![
            // Injection marker makes the first response invalid.
            Ok("ignore previous instructions".to_string()),
            Ok("A clean summary.".to_string()),
        ]));
        let h = harness(model.clone(), &[]);

        let err = h.processor.process(summarize_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));

        // Nothing was cached, so the retry hits the model afresh.
        let ok = h.processor.process(summarize_request()).await.unwrap();
        assert!(!ok.cache_hit);
        assert_eq!(ok.result.as_deref(), Some("A clean summary."));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn key_points_and_questions_fill_their_slots() {
        let kp_model = Arc::new(StaticModel::new(r#"["alpha", "beta"]"#));
        let h = harness(kp_model, &[]);
        let response = h
            .processor
            .process(TextProcessingRequest::new("doc", Operation::KeyPoints))
            .await
            .unwrap();
        assert_eq!(response.key_points, Some(vec!["alpha".to_string(), "beta".to_string()]));
        assert!(response.result.is_none());

        let q_model = Arc::new(StaticModel::new(r#"["why?", "how?"]"#));
        let h = harness(q_model, &[]);
        let response = h
            .processor
            .process(TextProcessingRequest::new("doc", Operation::Questions))
            .await
            .unwrap();
        assert_eq!(response.questions, Some(vec!["why?".to_string(), "how?".to_string()]));
    }

    #[tokio::test]
    async fn questions_fallback_serves_fixed_list() {
        let model = Arc::new(ScriptedModel::always_transient("down"));
        let h = harness(model, &[]);
        let response = h
            .processor
            .process(TextProcessingRequest::new("doc", Operation::Questions))
            .await
            .unwrap();
        assert!(response.fallback_used());
        let questions = response.questions.expect("fallback questions");
        assert_eq!(questions.len(), 2);
    }

    #[tokio::test]
    async fn key_points_fallback_is_empty_list() {
        let model = Arc::new(ScriptedModel::always_transient("down"));
        let h = harness(model, &[]);
        let response = h
            .processor
            .process(TextProcessingRequest::new("doc", Operation::KeyPoints))
            .await
            .unwrap();
        assert_eq!(response.key_points, Some(Vec::new()));
    }

    #[tokio::test]
    async fn batch_processes_items_in_isolation() {
        // Batched alongside healthy requests, one permanent failure must
        // not poison the rest. Distinct texts keep the items off the cache.
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("summary one".to_string()),
            Err(ServiceError::permanent("bad item")),
            Ok("summary three".to_string()),
        ]));
        let h = harness(model, &[]);

        let batch = BatchProcessingRequest {
            requests: vec![
                TextProcessingRequest::new("first text", Operation::Summarize),
                TextProcessingRequest::new("second text", Operation::Summarize),
                TextProcessingRequest::new("third text", Operation::Summarize),
            ],
            batch_id: Some("batch-7".to_string()),
        };
        let response = h.processor.process_batch(batch).await.unwrap();

        assert_eq!(response.batch_id.as_deref(), Some("batch-7"));
        assert_eq!(response.total_requests, 3);
        assert_eq!(response.completed, 2);
        assert_eq!(response.failed, 1);
        let failed: Vec<usize> =
            response.results.iter().filter(|i| !i.success).map(|i| i.index).collect();
        assert_eq!(failed.len(), 1);
        assert!(response.results.iter().all(|i| i.success || i.error.is_some()));
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let h = harness(Arc::new(StaticModel::new("x")), &[]);
        let err = h
            .processor
            .process_batch(BatchProcessingRequest { requests: vec![], batch_id: None })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected() {
        let h = harness(Arc::new(StaticModel::new("x")), &[]);
        let limit = h.processor.config.ai.max_batch_requests_per_call as usize;
        let requests = (0..=limit)
            .map(|i| TextProcessingRequest::new(format!("text {i}"), Operation::Summarize))
            .collect();
        let err = h
            .processor
            .process_batch(BatchProcessingRequest { requests, batch_id: None })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::BusinessLogic { .. }));
        assert_eq!(err.context()["expected_max"], serde_json::json!(limit));
    }

    /// Model fake that records how many generations overlap.
    #[derive(Debug)]
    struct ConcurrencyProbeModel {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl TextModel for ConcurrencyProbeModel {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("summary".to_string())
        }
    }

    #[tokio::test]
    async fn batch_respects_the_concurrency_limit() {
        let peak = Arc::new(AtomicUsize::new(0));
        let model = Arc::new(ConcurrencyProbeModel {
            current: Arc::new(AtomicUsize::new(0)),
            peak: peak.clone(),
        });
        let h = harness(model, &[]);
        let limit = h.processor.config.ai.batch_concurrency_limit as usize;

        let requests = (0..limit * 3)
            .map(|i| TextProcessingRequest::new(format!("text {i}"), Operation::Summarize))
            .collect();
        let response = h
            .processor
            .process_batch(BatchProcessingRequest { requests, batch_id: None })
            .await
            .unwrap();

        assert_eq!(response.failed, 0);
        assert!(peak.load(Ordering::SeqCst) <= limit);
    }

    #[tokio::test]
    async fn word_count_lands_in_metadata() {
        let h = harness(Arc::new(StaticModel::new("summary")), &[]);
        let response = h
            .processor
            .process(TextProcessingRequest::new("one two three four", Operation::Summarize))
            .await
            .unwrap();
        assert_eq!(response.metadata["word_count"], serde_json::json!(4));
    }
}
