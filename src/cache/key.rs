//! Deterministic cache key generation.
//!
//! Keys embed small texts verbatim so they stay human-debuggable; larger
//! texts are replaced by a content hash. The same inputs always produce the
//! same key across processes, and logically identical option bags hash
//! identically regardless of field order.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::config::{HashAlgorithm, TextSizeTiers};
use crate::domain::{Operation, ProcessingOptions};

/// All persisted keys carry this prefix.
pub const KEY_PREFIX: &str = "ai_cache:";

/// Hard ceiling on key length. Verbatim texts that would push a key past
/// this fall back to the hashed form.
pub const MAX_KEY_BYTES: usize = 512;

/// Size class of the input text. Boundaries are half-open: a text of
/// exactly `tiers.small` characters is medium tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTier {
    Small,
    Medium,
    Large,
    Xlarge,
}

impl TextTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTier::Small => "small",
            TextTier::Medium => "medium",
            TextTier::Large => "large",
            TextTier::Xlarge => "xlarge",
        }
    }
}

/// A generated key plus the tier it was derived from. The tier travels with
/// the key so the cache can decide on promotion without re-reading the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub key: String,
    pub tier: TextTier,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Builds cache keys from request inputs.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    tiers: TextSizeTiers,
    algorithm: HashAlgorithm,
    /// Extra verbatim-text cap from the AI tuning section, when present.
    text_hash_threshold: Option<usize>,
}

impl KeyGenerator {
    pub fn new(tiers: TextSizeTiers, algorithm: HashAlgorithm) -> Self {
        Self { tiers, algorithm, text_hash_threshold: None }
    }

    pub fn with_text_hash_threshold(mut self, threshold: usize) -> Self {
        self.text_hash_threshold = Some(threshold);
        self
    }

    /// Classify a text into its size tier by character count.
    pub fn tier(&self, text: &str) -> TextTier {
        let len = text.chars().count();
        if len < self.tiers.small {
            TextTier::Small
        } else if len < self.tiers.medium {
            TextTier::Medium
        } else if len < self.tiers.large {
            TextTier::Large
        } else {
            TextTier::Xlarge
        }
    }

    /// Build the key for one request.
    ///
    /// Format:
    /// `ai_cache:op:<op>|txt:<text-or-hash>|opts:<hash8>|q:<hash-or-empty>`
    pub fn key(
        &self,
        text: &str,
        operation: Operation,
        options: &ProcessingOptions,
        question: Option<&str>,
    ) -> CacheKey {
        let tier = self.tier(text);

        let txt = if self.embed_verbatim(text, tier) {
            normalize_whitespace(text)
        } else {
            self.hash(text)
        };

        let opts_hash = self.hash(&canonical_options_json(options));
        let opts = &opts_hash[..8];

        let q = match question {
            Some(question) => self.hash(question),
            None => String::new(),
        };

        let mut key = format!("{KEY_PREFIX}op:{operation}|txt:{txt}|opts:{opts}|q:{q}");
        if key.len() > MAX_KEY_BYTES {
            let hashed = self.hash(text);
            key = format!("{KEY_PREFIX}op:{operation}|txt:{hashed}|opts:{opts}|q:{q}");
        }
        CacheKey { key, tier }
    }

    fn embed_verbatim(&self, text: &str, tier: TextTier) -> bool {
        if tier != TextTier::Small {
            return false;
        }
        match self.text_hash_threshold {
            Some(threshold) => text.chars().count() < threshold,
            None => true,
        }
    }

    fn hash(&self, input: &str) -> String {
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let digest = Sha256::digest(input.as_bytes());
                let mut out = String::with_capacity(digest.len() * 2);
                for byte in digest {
                    use std::fmt::Write;
                    let _ = write!(out, "{byte:02x}");
                }
                out
            }
            HashAlgorithm::Blake3 => blake3::hash(input.as_bytes()).to_hex().to_string(),
        }
    }
}

/// Collapse whitespace runs to single spaces and trim the ends.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stable JSON for the option bag: sorted keys, absent fields omitted.
fn canonical_options_json(options: &ProcessingOptions) -> String {
    let mut map: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    if let Some(v) = options.max_length {
        map.insert("max_length", v.into());
    }
    if let Some(v) = options.max_points {
        map.insert("max_points", v.into());
    }
    if let Some(v) = options.num_questions {
        map.insert("num_questions", v.into());
    }
    if let Some(v) = &options.style {
        map.insert("style", v.clone().into());
    }
    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}
