//! Cache metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the host process installs a recorder
//! (the server installs the Prometheus one).

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_PROMOTIONS_TOTAL: &str = "cache_promotions_total";
    pub const CACHE_TIER_ERRORS_TOTAL: &str = "cache_tier_errors_total";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

/// Record a cache hit.
pub fn record_cache_hit(tier: &str) {
    counter!(names::CACHE_HITS_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record an L2 value copied into L1.
pub fn record_promotion() {
    counter!(names::CACHE_PROMOTIONS_TOTAL).increment(1);
}

/// Record a failed tier call.
pub fn record_tier_error(tier: &str, op: &'static str) {
    counter!(names::CACHE_TIER_ERRORS_TOTAL, "tier" => tier.to_string(), "op" => op).increment(1);
}

/// Set the number of cache entries.
pub fn set_cache_entries(tier: &str, count: u64) {
    gauge!(names::CACHE_ENTRIES, "tier" => tier.to_string()).set(count as f64);
}
