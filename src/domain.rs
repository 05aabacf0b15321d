//! Request and response types for the text-processing pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// The five supported text operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Summarize,
    Sentiment,
    KeyPoints,
    Questions,
    Qa,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Summarize,
        Operation::Sentiment,
        Operation::KeyPoints,
        Operation::Questions,
        Operation::Qa,
    ];

    /// Wire name, also used in cache keys and strategy maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Summarize => "summarize",
            Operation::Sentiment => "sentiment",
            Operation::KeyPoints => "key_points",
            Operation::Questions => "questions",
            Operation::Qa => "qa",
        }
    }

    pub fn parse(name: &str) -> Option<Operation> {
        match name {
            "summarize" => Some(Operation::Summarize),
            "sentiment" => Some(Operation::Sentiment),
            "key_points" => Some(Operation::KeyPoints),
            "questions" => Some(Operation::Questions),
            "qa" => Some(Operation::Qa),
            _ => None,
        }
    }

    /// QA is the only operation that takes a question.
    pub fn requires_question(&self) -> bool {
        matches!(self, Operation::Qa)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded option bag accepted alongside a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ProcessingOptions {
    pub fn is_empty(&self) -> bool {
        self.max_length.is_none()
            && self.max_points.is_none()
            && self.num_questions.is_none()
            && self.style.is_none()
    }
}

/// One processing request; owned by a single pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProcessingRequest {
    pub text: String,
    pub operation: Operation,
    #[serde(default)]
    pub options: ProcessingOptions,
    #[serde(default)]
    pub question: Option<String>,
}

impl TextProcessingRequest {
    pub fn new(text: impl Into<String>, operation: Operation) -> Self {
        Self { text: text.into(), operation, options: ProcessingOptions::default(), question: None }
    }

    pub fn with_options(mut self, options: ProcessingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    /// Boundary validation, run before any other work.
    pub fn validate(&self, max_text_length: usize) -> Result<(), ServiceError> {
        if self.text.trim().is_empty() {
            return Err(ServiceError::validation("text must not be empty")
                .with_context("field", "text")
                .with_context("operation", self.operation.as_str()));
        }
        let len = self.text.chars().count();
        if len > max_text_length {
            return Err(ServiceError::validation("text exceeds maximum length")
                .with_context("field", "text")
                .with_context("actual", len)
                .with_context("expected_max", max_text_length));
        }
        if self.operation.requires_question() {
            let missing = self.question.as_deref().map(str::trim).unwrap_or("").is_empty();
            if missing {
                return Err(ServiceError::permanent("question is required for qa operation")
                    .with_context("field", "question")
                    .with_context("operation", self.operation.as_str()));
            }
        }
        Ok(())
    }
}

/// Sentiment classification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    /// One of `positive`, `neutral`, `negative`.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub explanation: String,
}

impl SentimentResult {
    pub const ALLOWED_LABELS: [&'static str; 3] = ["positive", "neutral", "negative"];
}

/// Whether the response came from the normal path or the fallback path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Normal,
    Degraded,
}

/// Metadata bag attached to every response.
pub type ResponseMetadata = serde_json::Map<String, serde_json::Value>;

/// Result of one pipeline invocation. Exactly one result slot is populated
/// for the request's operation; the others serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextProcessingResponse {
    pub operation: Operation,
    pub success: bool,
    pub result: Option<String>,
    pub sentiment: Option<SentimentResult>,
    pub key_points: Option<Vec<String>>,
    pub questions: Option<Vec<String>>,
    pub processing_time_ms: f64,
    pub cache_hit: bool,
    pub metadata: ResponseMetadata,
}

impl TextProcessingResponse {
    /// Empty successful response shell; the processor fills the result slot
    /// and metadata.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            success: true,
            result: None,
            sentiment: None,
            key_points: None,
            questions: None,
            processing_time_ms: 0.0,
            cache_hit: false,
            metadata: ResponseMetadata::new(),
        }
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn service_status(&self) -> Option<&str> {
        self.metadata.get("service_status").and_then(|v| v.as_str())
    }

    pub fn fallback_used(&self) -> bool {
        self.metadata.get("fallback_used").and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

/// A batch of independent requests processed under one concurrency budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingRequest {
    pub requests: Vec<TextProcessingRequest>,
    #[serde(default)]
    pub batch_id: Option<String>,
}

/// Outcome of one item in a batch. Items fail independently; an error here
/// never fails the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    pub index: usize,
    pub success: bool,
    pub response: Option<TextProcessingResponse>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingResponse {
    pub batch_id: Option<String>,
    pub total_requests: usize,
    pub completed: usize,
    pub failed: usize,
    pub results: Vec<BatchItem>,
    pub total_processing_time_ms: f64,
}

/// Words separated by any whitespace; used for response metadata.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
