//! Error taxonomy shared across all components.
//!
//! Every failure in the core maps to one of these kinds. The resilience
//! orchestrator retries only the kinds marked retryable; everything else
//! propagates to the caller unchanged.

use std::collections::BTreeMap;

/// Structured context attached to an error: field names, expected vs.
/// actual values, operation, processing id. Sorted map so log output and
/// serialized form are deterministic.
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

/// Failure kind, independent of the concrete variant payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Authentication,
    Authorization,
    BusinessLogic,
    TransientInfrastructure,
    RateLimit,
    PermanentInfrastructure,
    ServiceUnavailable,
}

/// Unified error type for the text-processing core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    /// Invalid or conflicting configuration; fatal at startup, 400 when
    /// triggered by a user-driven override.
    #[error("configuration error: {message}")]
    Configuration { message: String, context: ErrorContext },

    /// Input failed validation at a boundary.
    #[error("validation error: {message}")]
    Validation { message: String, context: ErrorContext },

    /// Missing or invalid credentials.
    #[error("authentication error: {message}")]
    Authentication { message: String, context: ErrorContext },

    /// Credentials valid but insufficient.
    #[error("authorization error: {message}")]
    Authorization { message: String, context: ErrorContext },

    /// Domain rule violation.
    #[error("business logic error: {message}")]
    BusinessLogic { message: String, context: ErrorContext },

    /// Temporary infrastructure failure (timeout, 5xx, connection reset);
    /// retried by the resilience orchestrator.
    #[error("transient infrastructure error: {message}")]
    TransientInfrastructure { message: String, context: ErrorContext },

    /// Upstream rate limit; retryable, honoring the hint when present.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        /// Server-provided backoff hint in seconds, if any.
        retry_after_s: Option<u64>,
        context: ErrorContext,
    },

    /// Non-retryable infrastructure failure (400-class, malformed request,
    /// contract violation).
    #[error("permanent infrastructure error: {message}")]
    PermanentInfrastructure { message: String, context: ErrorContext },

    /// Emitted after retries are exhausted or a circuit is open.
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, context: ErrorContext },
}

impl ServiceError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), context: ErrorContext::new() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), context: ErrorContext::new() }
    }

    pub fn business_logic(message: impl Into<String>) -> Self {
        Self::BusinessLogic { message: message.into(), context: ErrorContext::new() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientInfrastructure { message: message.into(), context: ErrorContext::new() }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_s: Option<u64>) -> Self {
        Self::RateLimit { message: message.into(), retry_after_s, context: ErrorContext::new() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::PermanentInfrastructure { message: message.into(), context: ErrorContext::new() }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable { message: message.into(), context: ErrorContext::new() }
    }

    /// Attach a context entry, builder-style.
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context_mut().insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::BusinessLogic { .. } => ErrorKind::BusinessLogic,
            Self::TransientInfrastructure { .. } => ErrorKind::TransientInfrastructure,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::PermanentInfrastructure { .. } => ErrorKind::PermanentInfrastructure,
            Self::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
        }
    }

    /// Whether the resilience orchestrator may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientInfrastructure { .. } | Self::RateLimit { .. })
    }

    /// HTTP status the thin transport layer maps this kind to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Configuration { .. } => 500,
            Self::Validation { .. } => 400,
            Self::Authentication { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::BusinessLogic { .. } => 422,
            Self::TransientInfrastructure { .. } => 503,
            Self::RateLimit { .. } => 429,
            Self::PermanentInfrastructure { .. } => 502,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Configuration { message, .. }
            | Self::Validation { message, .. }
            | Self::Authentication { message, .. }
            | Self::Authorization { message, .. }
            | Self::BusinessLogic { message, .. }
            | Self::TransientInfrastructure { message, .. }
            | Self::RateLimit { message, .. }
            | Self::PermanentInfrastructure { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Configuration { context, .. }
            | Self::Validation { context, .. }
            | Self::Authentication { context, .. }
            | Self::Authorization { context, .. }
            | Self::BusinessLogic { context, .. }
            | Self::TransientInfrastructure { context, .. }
            | Self::RateLimit { context, .. }
            | Self::PermanentInfrastructure { context, .. }
            | Self::ServiceUnavailable { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Configuration { context, .. }
            | Self::Validation { context, .. }
            | Self::Authentication { context, .. }
            | Self::Authorization { context, .. }
            | Self::BusinessLogic { context, .. }
            | Self::TransientInfrastructure { context, .. }
            | Self::RateLimit { context, .. }
            | Self::PermanentInfrastructure { context, .. }
            | Self::ServiceUnavailable { context, .. } => context,
        }
    }
}
