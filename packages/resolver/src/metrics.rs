//! Process-wide cache counters.
//!
//! Lock-free atomics keyed by cache type. Hits and misses are recorded
//! on the foreground path; sets and errors mostly by detached background
//! tasks, so counters are only ever approximate ordering-wise — totals
//! are exact.

use std::sync::atomic::{AtomicU64, Ordering};

use geotag_database::address_cache::CacheType;
use serde::Serialize;

#[derive(Debug, Default)]
struct TypeCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    errors: AtomicU64,
}

/// Thread-safe cache counters, one set per cache type.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    counters: [TypeCounters; 4],
}

const fn index(cache_type: CacheType) -> usize {
    match cache_type {
        CacheType::Geocode => 0,
        CacheType::Reverse => 1,
        CacheType::Autocomplete => 2,
        CacheType::PlaceDetails => 3,
    }
}

impl CacheMetrics {
    /// Records a cache hit.
    pub fn record_hit(&self, cache_type: CacheType) {
        self.counters[index(cache_type)]
            .hits
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a cache miss.
    pub fn record_miss(&self, cache_type: CacheType) {
        self.counters[index(cache_type)]
            .misses
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a successful cache write.
    pub fn record_set(&self, cache_type: CacheType) {
        self.counters[index(cache_type)]
            .sets
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed cache read or write.
    pub fn record_error(&self, cache_type: CacheType) {
        self.counters[index(cache_type)]
            .errors
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let per_type: Vec<TypeSnapshot> = CacheType::ALL
            .iter()
            .map(|&cache_type| {
                let counters = &self.counters[index(cache_type)];
                TypeSnapshot {
                    cache_type: cache_type.to_string(),
                    hits: counters.hits.load(Ordering::Relaxed),
                    misses: counters.misses.load(Ordering::Relaxed),
                    sets: counters.sets.load(Ordering::Relaxed),
                    errors: counters.errors.load(Ordering::Relaxed),
                }
            })
            .collect();

        let hits: u64 = per_type.iter().map(|t| t.hits).sum();
        let misses: u64 = per_type.iter().map(|t| t.misses).sum();
        let sets: u64 = per_type.iter().map(|t| t.sets).sum();
        let errors: u64 = per_type.iter().map(|t| t.errors).sum();

        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        MetricsSnapshot {
            per_type,
            hits,
            misses,
            sets,
            errors,
            hit_rate,
        }
    }
}

/// Counter values for one cache type.
#[derive(Debug, Clone, Serialize)]
pub struct TypeSnapshot {
    /// The cache type these counters belong to.
    pub cache_type: String,
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that fell through to the provider chain.
    pub misses: u64,
    /// Successful cache writes.
    pub sets: u64,
    /// Failed cache reads and writes.
    pub errors: u64,
}

/// Point-in-time counter snapshot across all cache types.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Per-type counter values.
    pub per_type: Vec<TypeSnapshot>,
    /// Total hits.
    pub hits: u64,
    /// Total misses.
    pub misses: u64,
    /// Total sets.
    pub sets: u64,
    /// Total errors.
    pub errors: u64,
    /// `hits / (hits + misses)`, or zero before any lookup.
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_type() {
        let metrics = CacheMetrics::default();
        metrics.record_hit(CacheType::Geocode);
        metrics.record_hit(CacheType::Geocode);
        metrics.record_miss(CacheType::Geocode);
        metrics.record_miss(CacheType::Autocomplete);
        metrics.record_set(CacheType::Autocomplete);
        metrics.record_error(CacheType::Reverse);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 2);
        assert_eq!(snapshot.sets, 1);
        assert_eq!(snapshot.errors, 1);

        let geocode = &snapshot.per_type[0];
        assert_eq!(geocode.cache_type, "geocode");
        assert_eq!(geocode.hits, 2);
        assert_eq!(geocode.misses, 1);
    }

    #[test]
    fn hit_rate_zero_before_any_lookup() {
        let metrics = CacheMetrics::default();
        assert!((metrics.snapshot().hit_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hit_rate_is_hits_over_lookups() {
        let metrics = CacheMetrics::default();
        metrics.record_hit(CacheType::Geocode);
        metrics.record_hit(CacheType::Reverse);
        metrics.record_hit(CacheType::Reverse);
        metrics.record_miss(CacheType::Geocode);

        assert!((metrics.snapshot().hit_rate - 0.75).abs() < f64::EPSILON);
    }
}
