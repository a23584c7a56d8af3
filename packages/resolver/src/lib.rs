#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The cached geocoding resolver.
//!
//! Wraps the provider failover chain with a durable cache keyed by
//! operation fingerprint: normalize, hash, look up; on a hit,
//! reconstruct the result from the denormalized row and bump the hit
//! counter in the background; on a miss, invoke the chain and populate
//! the cache (and, for geocode and place details, the places store)
//! from detached tasks. Cache population never blocks the response, and
//! the detached tasks deliberately do not inherit the caller's deadline
//! — the caller's HTTP deadline usually elapses right after the
//! response is sent.
//!
//! `validate_address` always bypasses the cache: validation checks
//! *current* deliverability.

pub mod config;
pub mod eviction;
pub mod fingerprint;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use geotag_database::address_cache::{self, AddressCacheRow, CacheType, NewCacheEntry};
use geotag_geocoder::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, Suggestion,
    ValidationResult,
};
use geotag_places_models::NewPlace;
use serde::Serialize;
use switchy_database::Database;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::ResolverConfig;
use crate::metrics::CacheMetrics;

/// Deadline for detached cache-population tasks. Independent of the
/// caller's deadline.
const BACKGROUND_TASK_TIMEOUT: Duration = Duration::from_secs(5);

/// Concurrency for bulk geocode fan-out.
const BULK_CONCURRENCY: usize = 10;

/// Maximum addresses per bulk geocode request.
pub const BULK_MAX_ADDRESSES: usize = 100;

/// A resolver answer with an explicit hit flag, so callers never have
/// to infer cache behavior from wall-clock latency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    /// The operation result.
    pub value: T,
    /// Whether the answer was served from cache.
    pub cache_hit: bool,
}

impl<T> Resolved<T> {
    const fn cached(value: T) -> Self {
        Self {
            value,
            cache_hit: true,
        }
    }

    const fn live(value: T) -> Self {
        Self {
            value,
            cache_hit: false,
        }
    }
}

/// One address outcome within a bulk geocode.
#[derive(Debug, Clone, Serialize)]
pub struct BulkGeocodeItem {
    /// The input address.
    pub address: String,
    /// Whether the address resolved to a location.
    pub success: bool,
    /// Whether the answer came from cache.
    pub cached: bool,
    /// The resolved location, when found.
    pub result: Option<GeocodingResult>,
    /// The failure message, when resolution failed.
    pub error: Option<String>,
}

/// Aggregates for a bulk geocode run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BulkGeocodeSummary {
    /// Addresses processed.
    pub total: usize,
    /// Addresses that resolved.
    pub succeeded: usize,
    /// Addresses that errored or found nothing.
    pub failed: usize,
    /// Addresses served from cache.
    pub cached: usize,
}

/// Full bulk geocode outcome. The batch as a whole always succeeds;
/// individual failures are captured per address.
#[derive(Debug, Clone, Serialize)]
pub struct BulkGeocodeReport {
    /// Per-address outcomes, in input order.
    pub results: Vec<BulkGeocodeItem>,
    /// Aggregate counts.
    pub summary: BulkGeocodeSummary,
}

/// The cached resolver: fingerprint, look up, fail over, populate.
pub struct CachedResolver {
    db: Arc<dyn Database>,
    chain: Arc<dyn GeocodingProvider>,
    config: ResolverConfig,
    metrics: Arc<CacheMetrics>,
}

impl CachedResolver {
    /// Creates a resolver over the given database and provider chain.
    #[must_use]
    pub fn new(
        db: Arc<dyn Database>,
        chain: Arc<dyn GeocodingProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            db,
            chain,
            config,
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// The resolver's process-wide cache counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Resolves an address to a location, serving from cache within TTL.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider chain fails; cache
    /// failures degrade to a bypass and are never surfaced.
    pub async fn geocode(
        &self,
        address: &str,
    ) -> Result<Resolved<Option<GeocodingResult>>, GeocodeError> {
        if !self.config.enabled {
            return Ok(Resolved::live(self.chain.geocode(address).await?));
        }

        let key = fingerprint::geocode_key(address);
        let hash = fingerprint::key_hash(&key);

        if let Some(row) = self.cached_lookup(CacheType::Geocode, &hash).await {
            if let Some(result) = row_to_result(&row) {
                self.metrics.record_hit(CacheType::Geocode);
                self.spawn_hit_bump(row.id);
                return Ok(Resolved::cached(Some(result)));
            }
        }

        self.metrics.record_miss(CacheType::Geocode);
        let result = self.chain.geocode(address).await?;

        if let Some(result) = &result {
            self.spawn_cache_write(entry_from_result(
                CacheType::Geocode,
                key,
                hash,
                result,
                self.chain.name().to_string(),
                self.expires_at(CacheType::Geocode),
            ));
            self.spawn_store_place(result.clone());
        }

        Ok(Resolved::live(result))
    }

    /// Resolves a coordinate to the nearest address, serving from cache
    /// within TTL. Coordinates are rounded to six decimals for the
    /// fingerprint, so neighboring calls share an entry.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider chain fails.
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Resolved<Option<GeocodingResult>>, GeocodeError> {
        if !self.config.enabled {
            return Ok(Resolved::live(
                self.chain.reverse_geocode(latitude, longitude).await?,
            ));
        }

        let key = fingerprint::reverse_key(latitude, longitude);
        let hash = fingerprint::key_hash(&key);

        if let Some(row) = self.cached_lookup(CacheType::Reverse, &hash).await {
            if let Some(result) = row_to_result(&row) {
                self.metrics.record_hit(CacheType::Reverse);
                self.spawn_hit_bump(row.id);
                return Ok(Resolved::cached(Some(result)));
            }
        }

        self.metrics.record_miss(CacheType::Reverse);
        let result = self.chain.reverse_geocode(latitude, longitude).await?;

        if let Some(result) = &result {
            self.spawn_cache_write(entry_from_result(
                CacheType::Reverse,
                key,
                hash,
                result,
                self.chain.name().to_string(),
                self.expires_at(CacheType::Reverse),
            ));
        }

        Ok(Resolved::live(result))
    }

    /// Returns completion suggestions, serving from cache within TTL.
    /// Only non-empty suggestion lists are cached.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider chain fails.
    pub async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Resolved<Vec<Suggestion>>, GeocodeError> {
        if !self.config.enabled {
            return Ok(Resolved::live(
                self.chain.autocomplete(input, options).await?,
            ));
        }

        let key = fingerprint::autocomplete_key(input, options);
        let hash = fingerprint::key_hash(&key);

        if let Some(row) = self.cached_lookup(CacheType::Autocomplete, &hash).await {
            if let Some(json) = &row.response_json {
                match serde_json::from_str::<Vec<Suggestion>>(json) {
                    Ok(suggestions) => {
                        self.metrics.record_hit(CacheType::Autocomplete);
                        self.spawn_hit_bump(row.id);
                        return Ok(Resolved::cached(suggestions));
                    }
                    Err(e) => {
                        log::warn!("discarding undecodable autocomplete cache row {}: {e}", row.id);
                    }
                }
            }
        }

        self.metrics.record_miss(CacheType::Autocomplete);
        let suggestions = self.chain.autocomplete(input, options).await?;

        if !suggestions.is_empty() {
            match serde_json::to_string(&suggestions) {
                Ok(json) => {
                    let entry = NewCacheEntry {
                        cache_type: CacheType::Autocomplete,
                        cache_key: key,
                        key_hash: hash,
                        formatted_address: None,
                        latitude: None,
                        longitude: None,
                        street_number: None,
                        street_name: None,
                        city: None,
                        district: None,
                        state_code: None,
                        state_name: None,
                        country_code: None,
                        country_name: None,
                        postal_code: None,
                        external_place_id: None,
                        response_json: Some(json),
                        provider: Some(self.chain.name().to_string()),
                        expires_at: self.expires_at(CacheType::Autocomplete),
                    };
                    self.spawn_cache_write(entry);
                }
                Err(e) => log::warn!("failed to encode autocomplete suggestions: {e}"),
            }
        }

        Ok(Resolved::live(suggestions))
    }

    /// Resolves a provider place identifier, serving from cache within
    /// TTL.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider chain fails.
    pub async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Resolved<Option<GeocodingResult>>, GeocodeError> {
        if !self.config.enabled {
            return Ok(Resolved::live(self.chain.place_details(place_id).await?));
        }

        let key = fingerprint::place_details_key(place_id);
        let hash = fingerprint::key_hash(&key);

        if let Some(row) = self.cached_lookup(CacheType::PlaceDetails, &hash).await {
            if let Some(result) = row_to_result(&row) {
                self.metrics.record_hit(CacheType::PlaceDetails);
                self.spawn_hit_bump(row.id);
                return Ok(Resolved::cached(Some(result)));
            }
        }

        self.metrics.record_miss(CacheType::PlaceDetails);
        let result = self.chain.place_details(place_id).await?;

        if let Some(result) = &result {
            self.spawn_cache_write(entry_from_result(
                CacheType::PlaceDetails,
                key,
                hash,
                result,
                self.chain.name().to_string(),
                self.expires_at(CacheType::PlaceDetails),
            ));
            self.spawn_store_place(result.clone());
        }

        Ok(Resolved::live(result))
    }

    /// Checks address deliverability. Always bypasses the cache; a valid
    /// result is still promoted to the places store in the background.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the provider chain fails.
    pub async fn validate_address(
        &self,
        address: &str,
    ) -> Result<ValidationResult, GeocodeError> {
        let validation = self.chain.validate_address(address).await?;

        if validation.valid {
            if let Some(normalized) = &validation.normalized {
                self.spawn_store_place(normalized.clone());
            }
        }

        Ok(validation)
    }

    /// Geocodes up to [`BULK_MAX_ADDRESSES`] addresses with bounded
    /// concurrency. Individual failures are captured per address; the
    /// batch as a whole always succeeds.
    pub async fn bulk_geocode(&self, addresses: &[String]) -> BulkGeocodeReport {
        let semaphore = Arc::new(Semaphore::new(BULK_CONCURRENCY));

        let tasks = addresses.iter().map(|address| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok();
                match self.geocode(address).await {
                    Ok(resolved) => {
                        let success = resolved.value.is_some();
                        BulkGeocodeItem {
                            address: address.clone(),
                            success,
                            cached: resolved.cache_hit,
                            result: resolved.value,
                            error: (!success).then(|| "No results".to_string()),
                        }
                    }
                    Err(e) => BulkGeocodeItem {
                        address: address.clone(),
                        success: false,
                        cached: false,
                        result: None,
                        error: Some(e.to_string()),
                    },
                }
            }
        });

        let results = futures::future::join_all(tasks).await;

        let succeeded = results.iter().filter(|item| item.success).count();
        let cached = results.iter().filter(|item| item.cached).count();
        let summary = BulkGeocodeSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            cached,
        };

        BulkGeocodeReport { results, summary }
    }

    fn expires_at(&self, cache_type: CacheType) -> NaiveDateTime {
        let ttl = chrono::Duration::from_std(self.config.ttl(cache_type))
            .unwrap_or_else(|_| chrono::Duration::days(30));
        Utc::now().naive_utc() + ttl
    }

    /// A read failure is treated as a miss; the entry is re-fetched.
    async fn cached_lookup(
        &self,
        cache_type: CacheType,
        key_hash: &str,
    ) -> Option<AddressCacheRow> {
        match address_cache::lookup(
            self.db.as_ref(),
            cache_type,
            key_hash,
            Utc::now().naive_utc(),
        )
        .await
        {
            Ok(row) => row,
            Err(e) => {
                self.metrics.record_error(cache_type);
                log::warn!("cache lookup failed for {cache_type}: {e}");
                None
            }
        }
    }

    /// Fire-and-forget hit counter bump; failures are logged only.
    fn spawn_hit_bump(&self, id: i64) {
        let db = Arc::clone(&self.db);
        tokio::spawn(async move {
            match timeout(
                BACKGROUND_TASK_TIMEOUT,
                address_cache::increment_hit_count(db.as_ref(), id),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("hit count bump failed for cache row {id}: {e}"),
                Err(_) => log::warn!("hit count bump timed out for cache row {id}"),
            }
        });
    }

    /// Fire-and-forget cache upsert; failures count toward the error
    /// metric and are logged only.
    fn spawn_cache_write(&self, entry: NewCacheEntry) {
        let db = Arc::clone(&self.db);
        let metrics = Arc::clone(&self.metrics);
        let cache_type = entry.cache_type;

        tokio::spawn(async move {
            match timeout(
                BACKGROUND_TASK_TIMEOUT,
                address_cache::upsert(db.as_ref(), &entry),
            )
            .await
            {
                Ok(Ok(())) => metrics.record_set(cache_type),
                Ok(Err(e)) => {
                    metrics.record_error(cache_type);
                    log::warn!("cache write failed for {cache_type}: {e}");
                }
                Err(_) => {
                    metrics.record_error(cache_type);
                    log::warn!("cache write timed out for {cache_type}");
                }
            }
        });
    }

    /// Fire-and-forget place promotion: skipped when disabled, below the
    /// confidence floor, or lacking an external id to dedupe on.
    fn spawn_store_place(&self, result: GeocodingResult) {
        if !self.config.store_places {
            return;
        }
        if result
            .confidence
            .is_some_and(|confidence| confidence < self.config.min_confidence)
        {
            return;
        }
        let Some(external_id) = result.place_id.clone() else {
            return;
        };

        let db = Arc::clone(&self.db);
        tokio::spawn(async move {
            let store = async {
                match geotag_places::queries::get_place_by_external_id(db.as_ref(), &external_id)
                    .await
                {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        if let Err(e) =
                            geotag_places::queries::create_place(db.as_ref(), &place_from_result(&result))
                                .await
                        {
                            log::warn!("place insert failed for {external_id}: {e}");
                        }
                    }
                    Err(e) => log::warn!("place lookup failed for {external_id}: {e}"),
                }
            };

            if timeout(BACKGROUND_TASK_TIMEOUT, store).await.is_err() {
                log::warn!("place promotion timed out for {external_id}");
            }
        });
    }
}

/// Reconstructs a typed result from a cache row's denormalized columns.
/// Rows without coordinates (e.g. malformed writes) read as a miss.
fn row_to_result(row: &AddressCacheRow) -> Option<GeocodingResult> {
    let latitude = row.latitude?;
    let longitude = row.longitude?;

    Some(GeocodingResult {
        formatted_address: row.formatted_address.clone().unwrap_or_default(),
        latitude,
        longitude,
        street_number: row.street_number.clone(),
        street_name: row.street_name.clone(),
        city: row.city.clone(),
        district: row.district.clone(),
        state_code: row.state_code.clone(),
        state_name: row.state_name.clone(),
        country_code: row.country_code.clone(),
        country_name: row.country_name.clone(),
        postal_code: row.postal_code.clone(),
        place_id: row.external_place_id.clone(),
        place_types: Vec::new(),
        confidence: None,
        provider: row.provider.clone().unwrap_or_default(),
    })
}

/// Builds a cache entry from a live result. The `provider` column
/// records the resolver's view — the chain — rather than whichever
/// adapter happened to answer.
fn entry_from_result(
    cache_type: CacheType,
    cache_key: String,
    key_hash: String,
    result: &GeocodingResult,
    provider: String,
    expires_at: NaiveDateTime,
) -> NewCacheEntry {
    NewCacheEntry {
        cache_type,
        cache_key,
        key_hash,
        formatted_address: Some(result.formatted_address.clone()),
        latitude: Some(result.latitude),
        longitude: Some(result.longitude),
        street_number: result.street_number.clone(),
        street_name: result.street_name.clone(),
        city: result.city.clone(),
        district: result.district.clone(),
        state_code: result.state_code.clone(),
        state_name: result.state_name.clone(),
        country_code: result.country_code.clone(),
        country_name: result.country_name.clone(),
        postal_code: result.postal_code.clone(),
        external_place_id: result.place_id.clone(),
        response_json: serde_json::to_string(result).ok(),
        provider: Some(provider),
        expires_at,
    }
}

/// Builds a place from a live result for background promotion.
fn place_from_result(result: &GeocodingResult) -> NewPlace {
    NewPlace {
        external_place_id: result.place_id.clone(),
        formatted_address: result.formatted_address.clone(),
        latitude: result.latitude,
        longitude: result.longitude,
        geohash: None,
        street_number: result.street_number.clone(),
        street_name: result.street_name.clone(),
        city: result.city.clone(),
        district: result.district.clone(),
        state_code: result.state_code.clone(),
        state_name: result.state_name.clone(),
        country_code: result.country_code.clone(),
        country_name: result.country_name.clone(),
        postal_code: result.postal_code.clone(),
        place_types: result.place_types.clone(),
        source_provider: Some(result.provider.clone()),
        confidence: result.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> GeocodingResult {
        GeocodingResult {
            formatted_address: "123 Main Street, Sydney NSW 2000, Australia".to_string(),
            latitude: -33.8688,
            longitude: 151.2093,
            street_number: Some("123".to_string()),
            street_name: Some("Main Street".to_string()),
            city: Some("Sydney".to_string()),
            district: None,
            state_code: Some("NSW".to_string()),
            state_name: Some("New South Wales".to_string()),
            country_code: Some("AU".to_string()),
            country_name: Some("Australia".to_string()),
            postal_code: Some("2000".to_string()),
            place_id: Some("osm:node:123".to_string()),
            place_types: vec!["house".to_string()],
            confidence: Some(0.9),
            provider: "openstreetmap".to_string(),
        }
    }

    #[test]
    fn entry_round_trips_through_row() {
        let result = sample_result();
        let expires_at = Utc::now().naive_utc();
        let entry = entry_from_result(
            CacheType::Geocode,
            "geocode:123 main street, sydney".to_string(),
            "abc".to_string(),
            &result,
            "failover".to_string(),
            expires_at,
        );

        assert_eq!(entry.cache_type, CacheType::Geocode);
        assert_eq!(entry.latitude, Some(result.latitude));
        assert_eq!(entry.external_place_id.as_deref(), Some("osm:node:123"));
        assert_eq!(entry.provider.as_deref(), Some("failover"));
        assert!(entry.response_json.is_some());

        let row = AddressCacheRow {
            id: 1,
            cache_type: entry.cache_type,
            cache_key: entry.cache_key.clone(),
            key_hash: entry.key_hash.clone(),
            formatted_address: entry.formatted_address.clone(),
            latitude: entry.latitude,
            longitude: entry.longitude,
            street_number: entry.street_number.clone(),
            street_name: entry.street_name.clone(),
            city: entry.city.clone(),
            district: entry.district.clone(),
            state_code: entry.state_code.clone(),
            state_name: entry.state_name.clone(),
            country_code: entry.country_code.clone(),
            country_name: entry.country_name.clone(),
            postal_code: entry.postal_code.clone(),
            external_place_id: entry.external_place_id.clone(),
            response_json: entry.response_json.clone(),
            provider: entry.provider.clone(),
            hit_count: 0,
            expires_at,
            created_at: expires_at,
            updated_at: expires_at,
        };

        let rebuilt = row_to_result(&row).unwrap();
        assert_eq!(rebuilt.formatted_address, result.formatted_address);
        assert!((rebuilt.latitude - result.latitude).abs() < 1e-12);
        assert_eq!(rebuilt.city, result.city);
        assert_eq!(rebuilt.place_id, result.place_id);
    }

    #[test]
    fn row_without_coordinates_reads_as_miss() {
        let now = Utc::now().naive_utc();
        let row = AddressCacheRow {
            id: 1,
            cache_type: CacheType::Geocode,
            cache_key: String::new(),
            key_hash: String::new(),
            formatted_address: Some("x".to_string()),
            latitude: None,
            longitude: None,
            street_number: None,
            street_name: None,
            city: None,
            district: None,
            state_code: None,
            state_name: None,
            country_code: None,
            country_name: None,
            postal_code: None,
            external_place_id: None,
            response_json: None,
            provider: None,
            hit_count: 0,
            expires_at: now,
            created_at: now,
            updated_at: now,
        };

        assert!(row_to_result(&row).is_none());
    }

    #[test]
    fn place_promotion_mapping() {
        let result = sample_result();
        let place = place_from_result(&result);

        assert_eq!(place.external_place_id.as_deref(), Some("osm:node:123"));
        assert_eq!(place.source_provider.as_deref(), Some("openstreetmap"));
        assert_eq!(place.place_types, vec!["house".to_string()]);
        assert_eq!(place.confidence, Some(0.9));
        assert!(place.geohash.is_none());
    }
}
