//! One-stop imports for wiring the core together.
//!
//! ```rust
//! use textforge::prelude::*;
//! ```

pub use crate::cache::backend::{KvBackend, MemoryBackend, RedisBackend};
pub use crate::cache::AiResponseCache;
pub use crate::config::{
    ConfigBuilder, ConfigHandle, EnvSource, RuntimeConfig, ValidationResult,
};
pub use crate::domain::{
    BatchProcessingRequest, BatchProcessingResponse, Operation, ProcessingOptions,
    TextProcessingRequest, TextProcessingResponse,
};
pub use crate::error::{ErrorKind, ServiceError};
pub use crate::health::{ComponentStatus, HealthChecker, HealthStatus, SystemHealthStatus};
pub use crate::model::{ScriptedModel, StaticModel, TextModel};
pub use crate::presets::StrategyKind;
pub use crate::processor::TextProcessor;
pub use crate::resilience::Resilience;
pub use crate::service::ServiceCore;
pub use crate::sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
