//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - hex digest of the normalized question
pub type CacheKey = String;

/// In-memory request counters
///
/// `hits + misses == total_requests` holds after every lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
}

impl CacheCounters {
    pub(crate) fn record_hit(&mut self) {
        self.total_requests += 1;
        self.hits += 1;
    }

    pub(crate) fn record_miss(&mut self) {
        self.total_requests += 1;
        self.misses += 1;
    }
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Lookups since start or last clear
    pub total_requests: u64,

    /// Lookups served from disk
    pub hits: u64,

    /// Lookups that found nothing, an expired entry or a corrupt file
    pub misses: u64,

    /// `100 * hits / total_requests`, or 0 with no requests
    pub hit_rate_percent: f64,

    /// Entry files currently on disk
    pub entry_count: usize,

    /// Total size of entry files in bytes
    pub size_bytes: u64,
}

impl CacheStats {
    pub(crate) fn from_counters(counters: CacheCounters, entry_count: usize, size_bytes: u64) -> Self {
        Self {
            total_requests: counters.total_requests,
            hits: counters.hits,
            misses: counters.misses,
            hit_rate_percent: hit_rate(counters.hits, counters.total_requests),
            entry_count,
            size_bytes,
        }
    }

    /// Size of the cache directory in megabytes
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Hit rate as a percentage; 0 when there were no requests
pub fn hit_rate(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * hits as f64 / total as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ requests: {}, hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, size: {:.2} MB }}",
            self.total_requests,
            self.hits,
            self.misses,
            self.hit_rate_percent,
            self.entry_count,
            self.size_mb()
        )
    }
}
