//! Seam to the upstream generative model.
//!
//! The core treats the model as a black box `generate(prompt) -> text`;
//! transport, auth, and provider details live behind this trait. Scripted
//! fakes let tests drive every failure path deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ServiceError;

/// Upstream text-generation client.
#[async_trait]
pub trait TextModel: Send + Sync + std::fmt::Debug {
    /// Generate text for a fully built prompt.
    ///
    /// # Errors
    ///
    /// Implementations map provider failures onto the shared taxonomy:
    /// timeouts and 5xx as transient, quota errors as rate limits, and
    /// 400-class contract violations as permanent.
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;

    /// Cheap reachability probe used by the health aggregator. The default
    /// reports reachable; clients with a ping endpoint should override.
    ///
    /// # Errors
    ///
    /// `ServiceError` describing why the provider is unreachable.
    async fn healthcheck(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Model fake returning the same text for every prompt.
#[derive(Debug, Clone)]
pub struct StaticModel {
    response: String,
    calls: Arc<AtomicUsize>,
}

impl StaticModel {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into(), calls: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for StaticModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Model fake that plays back a scripted sequence of outcomes, one per
/// call. When the script runs dry it keeps repeating the last outcome.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Result<String, ServiceError>>>>,
    last: Arc<Mutex<Result<String, ServiceError>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(outcomes: Vec<Result<String, ServiceError>>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| Err(ServiceError::transient("scripted model has no outcomes")));
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            last: Arc::new(Mutex::new(last)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A model that always fails with the given transient error.
    pub fn always_transient(message: impl Into<String>) -> Self {
        Self::new(vec![Err(ServiceError::transient(message))])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
        match next {
            Some(outcome) => {
                *self.last.lock().unwrap_or_else(|p| p.into_inner()) = outcome.clone();
                outcome
            }
            None => self.last.lock().unwrap_or_else(|p| p.into_inner()).clone(),
        }
    }
}
