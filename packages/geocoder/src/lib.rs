#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geocoding provider adapters and the failover chain.
//!
//! Converts between street addresses and coordinates using a
//! multi-provider strategy configured via TOML files in `services/`:
//!
//! 1. **Mapbox** (priority 1) — Geocoding v6, requires an access token.
//! 2. **Photon** (priority 2) — komoot's OSM-backed geocoder, keyless,
//!    self-hostable.
//! 3. **`LocationIQ`** (priority 3) — Nominatim-shaped API with a key.
//! 4. **Nominatim / `OpenStreetMap`** (priority 4) — free, 1 req/sec rate
//!    limit on the public instance.
//! 5. **Google** (priority 5) — pay-per-use, consulted only when the free
//!    providers fail.
//! 6. **Mock** (priority 6) — deterministic fixtures, used only when no
//!    real provider is configured.
//!
//! Providers are loaded from the [`registry`], filtered by available
//! credentials, and executed in priority order by the [`failover`] chain.
//! Each adapter maps its vendor response onto the canonical component
//! set in [`GeocodingResult`]; see [`normalize`] for the shared rules.

pub mod failover;
pub mod google;
pub mod locationiq;
pub mod mapbox;
pub mod mock;
pub mod nominatim;
pub mod normalize;
pub mod photon;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout applied to every outbound provider HTTP call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A geocoded location normalized to the canonical component set.
///
/// Every provider adapter maps its vendor response onto these fields, so
/// callers never see vendor-specific shapes. Components that a provider
/// does not return are `None`; an address missing a street number is
/// still a valid result (validation decides deliverability).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    /// Full display address.
    pub formatted_address: String,
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// Building number.
    pub street_number: Option<String>,
    /// Street name.
    pub street_name: Option<String>,
    /// City / town / village (first non-empty in that order).
    pub city: Option<String>,
    /// District / neighborhood.
    pub district: Option<String>,
    /// State / province code (falls back to the long name).
    pub state_code: Option<String>,
    /// State / province long name.
    pub state_name: Option<String>,
    /// ISO 3166-1 alpha-2 country code, uppercase.
    pub country_code: Option<String>,
    /// Country long name.
    pub country_name: Option<String>,
    /// Postal / ZIP code.
    pub postal_code: Option<String>,
    /// Provider-assigned opaque place identifier (e.g. `"osm:node:123"`).
    pub place_id: Option<String>,
    /// Provider place-type tags, in provider order.
    pub place_types: Vec<String>,
    /// Match confidence in `[0, 1]`, when the provider reports one.
    pub confidence: Option<f64>,
    /// Which adapter produced this result.
    pub provider: String,
}

/// A single autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Human-readable suggestion text.
    pub description: String,
    /// Provider place identifier usable with `place_details`.
    pub place_id: Option<String>,
    /// Provider place-type tags.
    pub place_types: Vec<String>,
}

/// Result of an address validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the address resolved to a deliverable location.
    pub valid: bool,
    /// The normalized result, when the provider found one.
    pub normalized: Option<GeocodingResult>,
    /// Human-readable problems found with the address.
    pub issues: Vec<String>,
}

/// Options accepted by the autocomplete operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutocompleteOptions {
    /// Component filter string (e.g. `"country:AU|country:NZ"`).
    pub components: Option<String>,
    /// Preferred response language (BCP-47).
    pub language: Option<String>,
    /// Restrict suggestions to these place types.
    pub types: Vec<String>,
    /// Google session token for autocomplete billing, passed through.
    pub session_token: Option<String>,
}

impl AutocompleteOptions {
    /// Extracts the country codes from `components` entries of the form
    /// `country:XX`, lowercased, in order.
    #[must_use]
    pub fn country_codes(&self) -> Vec<String> {
        self.components
            .as_deref()
            .unwrap_or_default()
            .split('|')
            .filter_map(|part| part.trim().strip_prefix("country:"))
            .filter(|code| !code.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded (HTTP 429).
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Credentials rejected (HTTP 401 / 403).
    #[error("Invalid or missing credentials")]
    InvalidCredentials,

    /// Provider-side failure (5xx, vendor error payload, unsupported
    /// operation).
    #[error("Provider error: {message}")]
    Provider {
        /// Description of the provider failure.
        message: String,
    },

    /// Every provider in the failover chain failed.
    #[error("all providers failed, last error from {provider}: {source}")]
    AllProvidersFailed {
        /// Name of the last provider tried.
        provider: String,
        /// The error that provider returned.
        #[source]
        source: Box<GeocodeError>,
    },
}

/// Maps a non-success HTTP status onto the error taxonomy.
///
/// # Errors
///
/// Returns [`GeocodeError::InvalidCredentials`] for 401/403,
/// [`GeocodeError::RateLimited`] for 429, and
/// [`GeocodeError::Provider`] for any other non-2xx status.
pub(crate) fn check_status(provider: &str, status: reqwest::StatusCode) -> Result<(), GeocodeError> {
    if status.is_success() {
        return Ok(());
    }

    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            Err(GeocodeError::InvalidCredentials)
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => Err(GeocodeError::RateLimited),
        other => Err(GeocodeError::Provider {
            message: format!("{provider} returned status {other}"),
        }),
    }
}

/// Trait that all geocoding providers must implement.
///
/// Adapters are thin translators between a vendor HTTP surface and the
/// canonical schema. They never retry internally — retry semantics belong
/// to the failover chain. A `None` result means the provider answered
/// successfully but found nothing.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Returns the provider's registry identifier (e.g. `"mapbox"`).
    fn name(&self) -> &str;

    /// Resolves a free-form address to a location.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request or response parsing
    /// fails.
    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError>;

    /// Resolves a coordinate to the nearest address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request or response parsing
    /// fails.
    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodingResult>, GeocodeError>;

    /// Returns completion suggestions for a partial address.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request or response parsing
    /// fails.
    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError>;

    /// Resolves a provider place identifier to a full result.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request fails, the response
    /// cannot be parsed, or the provider has no lookup endpoint.
    async fn place_details(&self, place_id: &str)
    -> Result<Option<GeocodingResult>, GeocodeError>;

    /// Checks whether an address resolves to a deliverable location.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the HTTP request or response parsing
    /// fails.
    async fn validate_address(&self, address: &str) -> Result<ValidationResult, GeocodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_codes_parsed_in_order() {
        let options = AutocompleteOptions {
            components: Some("country:AU|country:nz".to_string()),
            ..AutocompleteOptions::default()
        };
        assert_eq!(options.country_codes(), vec!["au", "nz"]);
    }

    #[test]
    fn country_codes_empty_without_components() {
        assert!(AutocompleteOptions::default().country_codes().is_empty());
    }

    #[test]
    fn country_codes_ignores_other_filters() {
        let options = AutocompleteOptions {
            components: Some("locality:Sydney|country:AU".to_string()),
            ..AutocompleteOptions::default()
        };
        assert_eq!(options.country_codes(), vec!["au"]);
    }

    #[test]
    fn status_mapping() {
        assert!(check_status("test", reqwest::StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("test", reqwest::StatusCode::UNAUTHORIZED),
            Err(GeocodeError::InvalidCredentials)
        ));
        assert!(matches!(
            check_status("test", reqwest::StatusCode::TOO_MANY_REQUESTS),
            Err(GeocodeError::RateLimited)
        ));
        assert!(matches!(
            check_status("test", reqwest::StatusCode::BAD_GATEWAY),
            Err(GeocodeError::Provider { .. })
        ));
    }
}
