//! Cache counters.
//!
//! Recorded through the `metrics` facade; the server installs the Prometheus
//! recorder and renders them at `/metrics`.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "keygate_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "keygate_cache_misses_total";
    pub const CACHE_FILLS_TOTAL: &str = "keygate_cache_fills_total";
}

/// Record a cache hit.
pub fn record_cache_hit(entity: &'static str, count: u64) {
    counter!(names::CACHE_HITS_TOTAL, "entity" => entity).increment(count);
}

/// Record a cache miss.
pub fn record_cache_miss(entity: &'static str, count: u64) {
    counter!(names::CACHE_MISSES_TOTAL, "entity" => entity).increment(count);
}

/// Record records written to the cache after an entity store read.
pub fn record_cache_fill(entity: &'static str, count: u64) {
    counter!(names::CACHE_FILLS_TOTAL, "entity" => entity).increment(count);
}
