#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Place entity and query parameter types.
//!
//! These types represent the shapes of data as stored in and retrieved
//! from the `places` table. They are distinct from the API response
//! types in `geotag_server_models` and the provider result types in
//! `geotag_geocoder`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A permanent, curated geocoded location.
///
/// Compare a cache entry, which is ephemeral: places survive eviction,
/// can be verified by humans, and are searchable. Soft-deleted places
/// never appear in read results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Opaque 128-bit identifier, generated at insert time.
    pub id: Uuid,
    /// Provider-assigned identifier; globally unique when present and
    /// used for idempotent upsert.
    pub external_place_id: Option<String>,
    /// Full display address.
    pub formatted_address: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Geohash cell identifier, at most 12 characters.
    pub geohash: Option<String>,
    /// Building number.
    pub street_number: Option<String>,
    /// Street name.
    pub street_name: Option<String>,
    /// City.
    pub city: Option<String>,
    /// District / neighborhood.
    pub district: Option<String>,
    /// State code.
    pub state_code: Option<String>,
    /// State long name.
    pub state_name: Option<String>,
    /// ISO country code.
    pub country_code: Option<String>,
    /// Country long name.
    pub country_name: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Provider place-type tags, in provider order.
    pub place_types: Vec<String>,
    /// Which provider produced this place.
    pub source_provider: Option<String>,
    /// Match confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Human-asserted quality flag.
    pub verified: bool,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or upserting a place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewPlace {
    /// Provider-assigned identifier used for idempotent upsert.
    pub external_place_id: Option<String>,
    /// Full display address.
    pub formatted_address: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Geohash cell identifier; computed from the coordinates when
    /// absent.
    pub geohash: Option<String>,
    /// Building number.
    pub street_number: Option<String>,
    /// Street name.
    pub street_name: Option<String>,
    /// City.
    pub city: Option<String>,
    /// District / neighborhood.
    pub district: Option<String>,
    /// State code.
    pub state_code: Option<String>,
    /// State long name.
    pub state_name: Option<String>,
    /// ISO country code.
    pub country_code: Option<String>,
    /// Country long name.
    pub country_name: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Provider place-type tags.
    pub place_types: Vec<String>,
    /// Which provider produced this place.
    pub source_provider: Option<String>,
    /// Match confidence in `[0, 1]`.
    pub confidence: Option<f64>,
}

/// Filters for the full-text place search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceSearchFilter {
    /// Free-text query over the address fields; `None` or empty lists
    /// newest places first.
    pub query: Option<String>,
    /// ISO country code filter (uppercased before matching).
    pub country_code: Option<String>,
    /// City filter (case-insensitive equality).
    pub city: Option<String>,
    /// State code filter (uppercased before matching).
    pub state_code: Option<String>,
    /// Exact postal code filter.
    pub postal_code: Option<String>,
    /// Tri-state verified filter; `None` matches any.
    pub verified: Option<bool>,
    /// Page size; defaults to 20, capped at 100.
    pub limit: u32,
    /// Row offset.
    pub offset: u32,
}

impl Default for PlaceSearchFilter {
    fn default() -> Self {
        Self {
            query: None,
            country_code: None,
            city: None,
            state_code: None,
            postal_code: None,
            verified: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// A place with its distance from a nearby-search origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPlace {
    /// The matched place.
    pub place: Place,
    /// Great-circle distance from the query point, in kilometers.
    pub distance_km: f64,
}

/// Aggregate counters for the places stats endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceStats {
    /// Live (non-deleted) place count.
    pub total: i64,
    /// Verified place count.
    pub verified: i64,
    /// Top countries by place count, descending.
    pub countries: Vec<CountryCount>,
    /// Place counts per source provider.
    pub providers: Vec<ProviderCount>,
}

/// Place count for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    /// ISO country code.
    pub country_code: String,
    /// Number of live places.
    pub count: i64,
}

/// Place count for one source provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCount {
    /// Provider identifier.
    pub provider: String,
    /// Number of live places.
    pub count: i64,
}
