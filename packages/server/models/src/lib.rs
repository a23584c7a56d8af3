#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the geotag server.
//!
//! These types are serialized to JSON for the REST API. They are
//! separate from the provider result and place entity types to allow
//! independent evolution of the API contract.

use chrono::{DateTime, Utc};
use geotag_geocoder::GeocodingResult;
use geotag_places_models::{NearbyPlace, Place};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A coordinate pair as returned by the API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApiLocation {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
}

/// A geocoded address as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAddress {
    /// Full display address.
    pub formatted_address: String,
    /// Coordinates.
    pub location: ApiLocation,
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
    /// Provider place identifier.
    pub place_id: Option<String>,
    /// Provider place-type tags.
    pub place_types: Vec<String>,
    /// Match confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Which provider produced this result.
    pub provider: String,
}

impl From<GeocodingResult> for ApiAddress {
    fn from(result: GeocodingResult) -> Self {
        Self {
            formatted_address: result.formatted_address,
            location: ApiLocation {
                latitude: result.latitude,
                longitude: result.longitude,
            },
            street_number: result.street_number,
            street_name: result.street_name,
            city: result.city,
            district: result.district,
            state_code: result.state_code,
            state_name: result.state_name,
            country_code: result.country_code,
            country_name: result.country_name,
            postal_code: result.postal_code,
            place_id: result.place_id,
            place_types: result.place_types,
            confidence: result.confidence,
            provider: result.provider,
        }
    }
}

/// Whether an answer was served from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// `true` when the resolver answered from cache.
    pub hit: bool,
}

/// A stored place as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiPlace {
    /// Place identifier.
    pub id: Uuid,
    /// Provider place identifier.
    pub external_place_id: Option<String>,
    /// Full display address.
    pub formatted_address: String,
    /// Coordinates.
    pub location: ApiLocation,
    /// Geohash cell identifier.
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
    /// Human-asserted quality flag.
    pub verified: bool,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<Place> for ApiPlace {
    fn from(place: Place) -> Self {
        Self {
            id: place.id,
            external_place_id: place.external_place_id,
            formatted_address: place.formatted_address,
            location: ApiLocation {
                latitude: place.latitude,
                longitude: place.longitude,
            },
            geohash: place.geohash,
            street_number: place.street_number,
            street_name: place.street_name,
            city: place.city,
            district: place.district,
            state_code: place.state_code,
            state_name: place.state_name,
            country_code: place.country_code,
            country_name: place.country_name,
            postal_code: place.postal_code,
            place_types: place.place_types,
            source_provider: place.source_provider,
            confidence: place.confidence,
            verified: place.verified,
            created_at: place.created_at,
            updated_at: place.updated_at,
        }
    }
}

/// A nearby-search match with its distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiNearbyPlace {
    /// The matched place.
    #[serde(flatten)]
    pub place: ApiPlace,
    /// Great-circle distance from the query point, in kilometers.
    pub distance_km: f64,
}

impl From<NearbyPlace> for ApiNearbyPlace {
    fn from(nearby: NearbyPlace) -> Self {
        Self {
            place: nearby.place.into(),
            distance_km: nearby.distance_km,
        }
    }
}

/// Pagination metadata for search responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMeta {
    /// Total rows matching the filters.
    pub total: i64,
    /// Page size used.
    pub limit: u32,
    /// Row offset used.
    pub offset: u32,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Always `true` when the server is responding.
    pub healthy: bool,
    /// Crate version.
    pub version: String,
}

// ── Request parameter types ─────────────────────────────────────────

/// `GET /geotag/geocode` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeParams {
    /// Address to resolve.
    pub address: Option<String>,
}

/// `GET /geotag/reverse` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReverseParams {
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
}

/// `GET /geotag/autocomplete` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutocompleteParams {
    /// Partial address input.
    pub input: Option<String>,
    /// Comma-separated ISO country codes to restrict suggestions.
    pub country: Option<String>,
    /// Preferred response language.
    pub language: Option<String>,
    /// Comma-separated place-type restriction.
    pub types: Option<String>,
    /// Autocomplete billing session token, passed through.
    pub session_token: Option<String>,
}

/// `GET /geotag/places/search` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Free-text query.
    pub q: Option<String>,
    /// ISO country code filter.
    pub country: Option<String>,
    /// City filter.
    pub city: Option<String>,
    /// State code filter.
    pub state: Option<String>,
    /// Exact postal code filter.
    pub postal_code: Option<String>,
    /// Tri-state verified filter: `true`, `false`, or anything else for
    /// "any".
    pub verified: Option<String>,
    /// Page size.
    pub limit: Option<u32>,
    /// Row offset.
    pub offset: Option<u32>,
}

/// `GET /geotag/places/nearby` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct NearbyParams {
    /// Latitude of the search origin.
    pub lat: Option<f64>,
    /// Longitude of the search origin.
    pub lng: Option<f64>,
    /// Search radius in kilometers.
    pub radius: Option<f64>,
    /// Maximum results.
    pub limit: Option<u32>,
}

/// `POST /geotag/places/validate` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateBody {
    /// Address to validate.
    pub address: String,
}

/// `PUT /geotag/places/:id/verify` body.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct VerifyBody {
    /// Desired verified flag; defaults to `true`.
    pub verified: Option<bool>,
}

/// `POST /geotag/bulk/geocode` body.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkGeocodeBody {
    /// Addresses to resolve (1 to 100).
    pub addresses: Vec<String>,
}

/// `POST /geotag/cache/clear` body.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct CacheClearBody {
    /// Rows deleted per batch; defaults to the eviction batch size.
    pub batch_size: Option<u32>,
}
