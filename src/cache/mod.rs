//! Tiered AI response cache: in-process L1 over an optional remote L2.
//!
//! L1 answers first; L2 misses and failures degrade silently to a cache
//! miss so an unreachable backend never takes requests down with it. Small
//! texts found in L2 are promoted into L1 when smart promotion is on.

pub mod backend;
pub mod compression;
pub mod key;
pub mod memory;
pub mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CacheSettings;
use crate::domain::{Operation, ProcessingOptions, TextProcessingResponse};
use crate::error::ServiceError;

use backend::{BackendInfo, KvBackend, RedisBackend};
use compression::{decompress, maybe_compress};
use key::{CacheKey, KeyGenerator, TextTier, KEY_PREFIX};
use memory::MemoryCache;
use stats::{CacheCounters, CacheStatsReport, MemoryTierStats};

/// One cached response with the bookkeeping the tiers need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEntry {
    pub response: TextProcessingResponse,
    pub tier: TextTier,
    pub ttl_s: u64,
    pub cached_at_epoch_ms: u64,
}

impl CachedEntry {
    pub fn new(response: TextProcessingResponse, tier: TextTier, ttl_s: u64) -> Self {
        Self { response, tier, ttl_s, cached_at_epoch_ms: epoch_millis() }
    }

    pub fn is_expired(&self) -> bool {
        epoch_millis() >= self.cached_at_epoch_ms + self.ttl_s * 1000
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// The tiered cache. Safe to share behind an `Arc`; the L1 lock is held
/// only for map operations and all L2 traffic happens outside it.
#[derive(Debug)]
pub struct AiResponseCache {
    settings: CacheSettings,
    keygen: KeyGenerator,
    l1: MemoryCache,
    l2: Option<Arc<dyn KvBackend>>,
    counters: CacheCounters,
}

impl AiResponseCache {
    /// L1-only cache (no remote tier).
    pub fn new(settings: CacheSettings) -> Self {
        Self::build(settings, None)
    }

    /// Cache over an explicit backend; how tests and embedders inject an L2.
    pub fn with_backend(settings: CacheSettings, backend: Arc<dyn KvBackend>) -> Self {
        Self::build(settings, Some(backend))
    }

    /// Connect the configured Redis backend. Connection failure degrades to
    /// an L1-only cache with a warning; it is never fatal.
    pub async fn connect(settings: CacheSettings) -> Self {
        if !settings.enabled {
            return Self::build(settings, None);
        }
        let Some(url) = settings.redis_url.clone() else {
            return Self::build(settings, None);
        };
        match RedisBackend::connect(&url, settings.redis_password.as_deref()).await {
            Ok(backend) => Self::build(settings, Some(Arc::new(backend))),
            Err(error) => {
                warn!(%error, "redis unavailable, running with memory cache only");
                Self::build(settings, None)
            }
        }
    }

    fn build(settings: CacheSettings, l2: Option<Arc<dyn KvBackend>>) -> Self {
        let mut keygen =
            KeyGenerator::new(settings.text_size_tiers, settings.hash_algorithm());
        if let Some(ai) = settings.ai {
            keygen = keygen.with_text_hash_threshold(ai.text_hash_threshold);
        }
        let l1 = MemoryCache::new(settings.memory_cache_size);
        Self { settings, keygen, l1, l2, counters: CacheCounters::default() }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Build the cache key for one request.
    pub fn key_for(
        &self,
        text: &str,
        operation: Operation,
        options: &ProcessingOptions,
        question: Option<&str>,
    ) -> CacheKey {
        self.keygen.key(text, operation, options, question)
    }

    /// Look up a response. L1 first, then L2; an unreachable L2 reads as a
    /// miss. Small-tier L2 hits are promoted into L1.
    pub async fn get(&self, key: &CacheKey) -> Option<TextProcessingResponse> {
        if !self.settings.enabled {
            return None;
        }
        let started = Instant::now();
        let result = self.get_inner(key).await;
        self.counters.record_op_time(started.elapsed());
        result
    }

    async fn get_inner(&self, key: &CacheKey) -> Option<TextProcessingResponse> {
        if let Some(entry) = self.l1.get(&key.key) {
            debug!(key = %key.key, "l1 cache hit");
            self.counters.record_l1_hit();
            return Some(entry.response);
        }

        let Some(backend) = &self.l2 else {
            self.counters.record_miss();
            return None;
        };

        let bytes = match backend.get(&key.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.record_miss();
                return None;
            }
            Err(error) => {
                warn!(key = %key.key, %error, "l2 get failed, treating as miss");
                self.counters.record_l2_error();
                self.counters.record_miss();
                return None;
            }
        };

        let entry = match decode_entry(&bytes) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key = %key.key, %error, "corrupted cache entry, evicting");
                self.counters.record_corrupt_entry();
                if let Err(error) = backend.delete(&key.key).await {
                    warn!(key = %key.key, %error, "failed to evict corrupted entry");
                }
                self.counters.record_miss();
                return None;
            }
        };

        debug!(key = %key.key, tier = entry.tier.as_str(), "l2 cache hit");
        self.counters.record_l2_hit();
        if entry.tier == TextTier::Small && self.settings.smart_promotion_enabled() {
            self.l1.insert(key.key.clone(), entry.clone());
        }
        Some(entry.response)
    }

    /// Store a response under the operation's configured TTL.
    pub async fn set(
        &self,
        key: &CacheKey,
        response: &TextProcessingResponse,
        operation: Operation,
    ) {
        self.set_with_ttl(key, response, self.settings.ttl_for(operation)).await;
    }

    /// Store a response with an explicit TTL; the fallback path uses this
    /// to keep degraded responses short-lived.
    pub async fn set_with_ttl(
        &self,
        key: &CacheKey,
        response: &TextProcessingResponse,
        ttl: Duration,
    ) {
        if !self.settings.enabled {
            return;
        }
        let started = Instant::now();

        let entry = CachedEntry::new(response.clone(), key.tier, ttl.as_secs());
        let serialized = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(key = %key.key, %error, "failed to serialize cache entry");
                return;
            }
        };
        let compressed = serialized.len() >= self.settings.compression_threshold_bytes;
        let blob = maybe_compress(
            serialized,
            self.settings.compression_threshold_bytes,
            self.settings.compression_level,
        );

        if let Some(backend) = &self.l2 {
            if let Err(error) = backend.set(&key.key, &blob, ttl).await {
                warn!(key = %key.key, %error, "l2 set failed, entry kept in memory only");
                self.counters.record_l2_error();
            }
        }
        self.l1.insert(key.key.clone(), entry);
        self.counters.record_set(compressed);
        self.counters.record_op_time(started.elapsed());
    }

    /// Remove every key matching `*<fragment>*` from both tiers and emit an
    /// invalidation event. Returns the number of keys removed.
    pub async fn invalidate_pattern(&self, fragment: &str, context: &str) -> usize {
        if !self.settings.enabled {
            return 0;
        }
        let pattern = format!("{KEY_PREFIX}*{fragment}*");
        let mut removed = 0usize;

        if let Some(backend) = &self.l2 {
            match backend.keys(&pattern).await {
                Ok(keys) => {
                    for key in &keys {
                        match backend.delete(key).await {
                            Ok(()) => removed += 1,
                            Err(error) => {
                                warn!(key, %error, "failed to delete key during invalidation");
                                self.counters.record_l2_error();
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(%pattern, %error, "l2 key enumeration failed during invalidation");
                    self.counters.record_l2_error();
                }
            }
        }

        let l1_removed = self.l1.remove_matching(fragment);
        if self.l2.is_none() {
            removed = l1_removed;
        }

        self.counters.record_invalidated(removed as u64);
        info!(
            pattern = %pattern,
            keys_removed = removed,
            context,
            timestamp_ms = epoch_millis(),
            "cache invalidation"
        );
        removed
    }

    /// Invalidate every cached response for one operation.
    pub async fn invalidate_by_operation(&self, operation: Operation, context: &str) -> usize {
        self.invalidate_pattern(&format!("op:{operation}"), context).await
    }

    /// Invalidate everything under the cache prefix.
    pub async fn clear_all(&self, context: &str) -> usize {
        self.invalidate_pattern("", context).await
    }

    /// Drop the L1 tier only; L2 entries survive. Useful under memory
    /// pressure.
    pub fn invalidate_l1(&self, context: &str) {
        let removed = self.l1.clear();
        info!(keys_removed = removed, context, "l1 cache cleared");
    }

    /// Current stats across both tiers plus performance counters.
    pub async fn stats(&self) -> CacheStatsReport {
        let l2 = match &self.l2 {
            None => BackendInfo::default(),
            Some(backend) => match backend.info().await {
                Ok(info) => info,
                Err(error) => {
                    warn!(%error, "l2 info probe failed");
                    self.counters.record_l2_error();
                    BackendInfo::default()
                }
            },
        };
        CacheStatsReport {
            l2,
            l1: MemoryTierStats {
                entries: self.l1.len(),
                capacity: self.l1.capacity(),
                utilization: self.l1.len() as f64 / self.l1.capacity() as f64,
            },
            performance: self.counters.snapshot(),
        }
    }

    /// Quick reachability probe for health checks: round-trips the backend
    /// info call when an L2 is configured.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        match &self.l2 {
            None => Ok(()),
            Some(backend) => backend
                .info()
                .await
                .map(|_| ())
                .map_err(|e| ServiceError::transient(e.to_string())),
        }
    }

    pub fn has_l2(&self) -> bool {
        self.l2.is_some()
    }
}

fn decode_entry(bytes: &[u8]) -> Result<CachedEntry, ServiceError> {
    let raw = decompress(bytes).map_err(|e| {
        ServiceError::transient("cache entry decompression failed")
            .with_context("error", e.to_string())
    })?;
    serde_json::from_slice(&raw).map_err(|e| {
        ServiceError::transient("cache entry deserialization failed")
            .with_context("error", e.to_string())
    })
}
