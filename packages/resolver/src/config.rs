//! Resolver and eviction worker configuration.
//!
//! Both option sets are environment-driven, matching the rest of the
//! deployment surface. Absent or malformed variables fall back to the
//! defaults.

use std::time::Duration;

use geotag_database::address_cache::CacheType;

const DAY: u64 = 24 * 60 * 60;

/// Recognized cached-resolver options.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Master switch; when `false` every call delegates straight to the
    /// provider chain.
    pub enabled: bool,
    /// TTL for forward geocode entries.
    pub geocode_ttl: Duration,
    /// TTL for reverse geocode entries.
    pub reverse_ttl: Duration,
    /// TTL for place details entries.
    pub place_details_ttl: Duration,
    /// TTL for autocomplete entries.
    pub autocomplete_ttl: Duration,
    /// Whether resolver misses promote results into the places store.
    pub store_places: bool,
    /// Minimum confidence for a result to be promoted to a place.
    pub min_confidence: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            geocode_ttl: Duration::from_secs(30 * DAY),
            reverse_ttl: Duration::from_secs(30 * DAY),
            place_details_ttl: Duration::from_secs(30 * DAY),
            autocomplete_ttl: Duration::from_secs(7 * DAY),
            store_places: true,
            min_confidence: 0.7,
        }
    }
}

impl ResolverConfig {
    /// Reads resolver options from the environment, defaulting anything
    /// absent or malformed.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            enabled: env_bool("GEOCODE_CACHE_ENABLED", defaults.enabled),
            geocode_ttl: env_secs("GEOCODE_TTL_SECS", defaults.geocode_ttl),
            reverse_ttl: env_secs("REVERSE_TTL_SECS", defaults.reverse_ttl),
            place_details_ttl: env_secs("PLACE_DETAILS_TTL_SECS", defaults.place_details_ttl),
            autocomplete_ttl: env_secs("AUTOCOMPLETE_TTL_SECS", defaults.autocomplete_ttl),
            store_places: env_bool("STORE_PLACES", defaults.store_places),
            min_confidence: std::env::var("MIN_CONFIDENCE")
                .ok()
                .and_then(|value| value.parse::<f64>().ok())
                .map_or(defaults.min_confidence, |value| value.clamp(0.0, 1.0)),
        }
    }

    /// TTL for the given cache type.
    #[must_use]
    pub const fn ttl(&self, cache_type: CacheType) -> Duration {
        match cache_type {
            CacheType::Geocode => self.geocode_ttl,
            CacheType::Reverse => self.reverse_ttl,
            CacheType::Autocomplete => self.autocomplete_ttl,
            CacheType::PlaceDetails => self.place_details_ttl,
        }
    }
}

/// Recognized eviction worker options.
#[derive(Debug, Clone)]
pub struct EvictionConfig {
    /// Sweep period.
    pub interval: Duration,
    /// Rows deleted per batch.
    pub batch_size: u32,
    /// Whether the worker runs at all.
    pub enabled: bool,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            batch_size: 1000,
            enabled: true,
        }
    }
}

impl EvictionConfig {
    /// Reads eviction options from the environment, defaulting anything
    /// absent or malformed.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            interval: env_secs("CACHE_EVICTION_INTERVAL_SECS", defaults.interval),
            batch_size: std::env::var("CACHE_EVICTION_BATCH_SIZE")
                .ok()
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|&value| value > 0)
                .unwrap_or(defaults.batch_size),
            enabled: env_bool("CACHE_EVICTION_ENABLED", defaults.enabled),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map_or(default, |value| {
        !matches!(value.as_str(), "false" | "0" | "off")
    })
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_defaults() {
        let config = ResolverConfig::default();
        assert!(config.enabled);
        assert_eq!(config.geocode_ttl, Duration::from_secs(30 * DAY));
        assert_eq!(config.autocomplete_ttl, Duration::from_secs(7 * DAY));
        assert!(config.store_places);
        assert!((config.min_confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn ttl_selected_by_cache_type() {
        let config = ResolverConfig::default();
        assert_eq!(config.ttl(CacheType::Geocode), config.geocode_ttl);
        assert_eq!(config.ttl(CacheType::Autocomplete), config.autocomplete_ttl);
    }

    #[test]
    fn eviction_defaults() {
        let config = EvictionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.batch_size, 1000);
        assert!(config.enabled);
    }
}
