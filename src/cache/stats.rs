//! Cache performance counters.
//!
//! Counters are plain atomics so hot-path updates never contend on a lock;
//! the snapshot is computed on demand for the stats endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::backend::BackendInfo;

/// Shared hot-path counters.
#[derive(Debug, Default)]
pub struct CacheCounters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    compressed_writes: AtomicU64,
    l2_errors: AtomicU64,
    corrupt_entries: AtomicU64,
    invalidated_keys: AtomicU64,
    op_time_nanos: AtomicU64,
    op_count: AtomicU64,
}

impl CacheCounters {
    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self, compressed: bool) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        if compressed {
            self.compressed_writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_l2_error(&self) {
        self.l2_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_corrupt_entry(&self) {
        self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidated(&self, keys: u64) {
        self.invalidated_keys.fetch_add(keys, Ordering::Relaxed);
    }

    pub fn record_op_time(&self, elapsed: Duration) {
        self.op_time_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.op_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PerformanceStats {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = l1_hits + l2_hits + misses;
        let op_count = self.op_count.load(Ordering::Relaxed);
        let op_time_nanos = self.op_time_nanos.load(Ordering::Relaxed);

        PerformanceStats {
            l1_hits,
            l2_hits,
            misses,
            total_lookups: lookups,
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                (l1_hits + l2_hits) as f64 / lookups as f64
            },
            sets: self.sets.load(Ordering::Relaxed),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            l2_errors: self.l2_errors.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            invalidated_keys: self.invalidated_keys.load(Ordering::Relaxed),
            avg_op_time_ms: if op_count == 0 {
                0.0
            } else {
                op_time_nanos as f64 / op_count as f64 / 1_000_000.0
            },
        }
    }
}

/// Performance section of the stats report.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PerformanceStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub total_lookups: u64,
    pub hit_ratio: f64,
    pub sets: u64,
    pub compressed_writes: u64,
    pub l2_errors: u64,
    pub corrupt_entries: u64,
    pub invalidated_keys: u64,
    pub avg_op_time_ms: f64,
}

/// L1 section of the stats report.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MemoryTierStats {
    pub entries: usize,
    pub capacity: usize,
    pub utilization: f64,
}

/// Full stats report: L2 health, L1 occupancy, and performance counters.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CacheStatsReport {
    pub l2: BackendInfo,
    pub l1: MemoryTierStats,
    pub performance: PerformanceStats,
}
