//! Health aggregation across registered component probes.
//!
//! Probes run concurrently and isolated: one slow or panicking component
//! never hides the others. Each probe gets its own timeout and retry
//! schedule; the system status is the worst individual status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use tracing::warn;

use crate::config::HealthSettings;
use crate::error::ServiceError;
use crate::sleeper::{Sleeper, TokioSleeper};

/// Component health rank. Ordering is by severity, so `max` of a set is
/// the worst status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Result of probing one component.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ComponentStatus {
    pub name: String,
    pub status: HealthStatus,
    /// Wall time of the whole check, including retries and backoff sleeps.
    pub response_time_ms: f64,
    pub message: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ComponentStatus {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Healthy, "")
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Degraded, message)
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, HealthStatus::Unhealthy, message)
    }

    fn new(name: impl Into<String>, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            response_time_ms: 0.0,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Roll-up across all registered components.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SystemHealthStatus {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentStatus>,
    pub timestamp_epoch_ms: u64,
}

type Probe =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ComponentStatus, ServiceError>> + Send + Sync>;

/// Registry and runner for component probes.
pub struct HealthChecker {
    settings: HealthSettings,
    probes: Mutex<HashMap<String, Probe>>,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> =
            self.probes.lock().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect();
        f.debug_struct("HealthChecker")
            .field("settings", &self.settings)
            .field("probes", &names)
            .finish()
    }
}

impl HealthChecker {
    pub fn new(settings: HealthSettings) -> Self {
        Self { settings, probes: Mutex::new(HashMap::new()), sleeper: Arc::new(TokioSleeper) }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Register a probe under a component name. Re-registering a name
    /// replaces the previous probe.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` when the name is empty.
    pub fn register<F, Fut>(&self, name: &str, probe: F) -> Result<(), ServiceError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ComponentStatus, ServiceError>> + Send + 'static,
    {
        if name.trim().is_empty() {
            return Err(ServiceError::validation("component name must not be empty"));
        }
        let probe: Probe = Arc::new(move || Box::pin(probe()));
        self.probes.lock().unwrap_or_else(|p| p.into_inner()).insert(name.to_string(), probe);
        Ok(())
    }

    pub fn registered_components(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.probes.lock().unwrap_or_else(|p| p.into_inner()).keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe one component by name.
    ///
    /// # Errors
    ///
    /// `ServiceError::Validation` when no probe is registered under `name`.
    pub async fn check(&self, name: &str) -> Result<ComponentStatus, ServiceError> {
        let probe = self
            .probes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| {
                ServiceError::validation("no health check registered for component")
                    .with_context("component", name)
            })?;
        Ok(self.run_probe(name, probe).await)
    }

    /// Probe every registered component concurrently and roll up the worst
    /// status. An empty registry reports healthy.
    pub async fn check_all(&self) -> SystemHealthStatus {
        let probes: Vec<(String, Probe)> = {
            let map = self.probes.lock().unwrap_or_else(|p| p.into_inner());
            let mut entries: Vec<(String, Probe)> =
                map.iter().map(|(name, probe)| (name.clone(), probe.clone())).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };

        let checks = probes.into_iter().map(|(name, probe)| async move {
            self.run_probe(&name, probe).await
        });
        let components = futures::future::join_all(checks).await;

        let overall_status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        SystemHealthStatus {
            overall_status,
            components,
            timestamp_epoch_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }

    /// Run one probe with timeout, retry, and backoff. Never errors: probe
    /// failures become component statuses.
    async fn run_probe(&self, name: &str, probe: Probe) -> ComponentStatus {
        let timeout = self.settings.timeout_for(name);
        let attempts = self.settings.retry_count as usize + 1;
        let started = Instant::now();
        let mut last_status: Option<ComponentStatus> = None;

        for attempt in 0..attempts {
            let outcome = tokio::time::timeout(timeout, probe()).await;
            match outcome {
                Ok(Ok(mut status)) => {
                    status.response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
                    return status;
                }
                Ok(Err(error)) => {
                    warn!(component = name, attempt, %error, "health check failed");
                    last_status = Some(ComponentStatus::unhealthy(name, error.to_string()));
                }
                Err(_) => {
                    warn!(
                        component = name,
                        attempt,
                        timeout_ms = timeout.as_millis() as u64,
                        "health check timed out"
                    );
                    last_status = Some(ComponentStatus::degraded(
                        name,
                        format!("timed out after {}ms", timeout.as_millis()),
                    ));
                }
            }

            if attempt + 1 < attempts && self.settings.backoff_base_s > 0.0 {
                let delay = Duration::from_secs_f64(
                    self.settings.backoff_base_s * 2f64.powi(attempt as i32),
                );
                self.sleeper.sleep(delay).await;
            }
        }

        let mut status =
            last_status.unwrap_or_else(|| ComponentStatus::unhealthy(name, "probe never ran"));
        status.response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        status
    }
}
