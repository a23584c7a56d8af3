//! Compile-time registry of geocoding service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The
//! registry embeds these at compile time, exposes them via
//! [`all_services`] and [`enabled_services`], and builds the failover
//! chain from whatever credentials the environment supplies.
//!
//! The priority ordering is deliberate: free, high-quality providers
//! first; pay-per-use Google last so it is only consulted when the free
//! providers fail; Mock only when no real provider is configured at all.

use serde::Deserialize;

use crate::failover::FailoverChain;
use crate::{GeocodeError, GeocodingProvider, google, locationiq, mapbox, mock, nominatim, photon};

/// A geocoding service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"mapbox"`, `"openstreetmap"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service participates in chain building.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Execution order — lower values run first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Mapbox Geocoding v6.
    Mapbox {
        /// API base URL.
        base_url: String,
    },
    /// Photon (komoot) geocoder.
    Photon {
        /// Default instance URL; overridable via `PHOTON_URL`.
        base_url: String,
    },
    /// `LocationIQ` geocoder.
    Locationiq {
        /// API base URL.
        base_url: String,
    },
    /// Nominatim / `OpenStreetMap` geocoder.
    Nominatim {
        /// API base URL.
        base_url: String,
    },
    /// Google Geocoding / Places.
    Google {
        /// API base URL.
        base_url: String,
    },
    /// Deterministic mock fixtures.
    Mock,
}

const fn default_true() -> bool {
    true
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("mapbox", include_str!("../services/mapbox.toml")),
    ("photon", include_str!("../services/photon.toml")),
    ("locationiq", include_str!("../services/locationiq.toml")),
    ("openstreetmap", include_str!("../services/openstreetmap.toml")),
    ("google", include_str!("../services/google.toml")),
    ("mock", include_str!("../services/mock.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 6;

/// Returns all geocoding service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time
/// guarantee since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Credentials and switches that decide which providers join the chain.
///
/// A missing credential silently omits its provider; it is never
/// inserted as a failing stub.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    /// `MAPBOX_ACCESS_TOKEN`.
    pub mapbox_access_token: Option<String>,
    /// `PHOTON_URL`. `None` disables Photon; the registry default is
    /// applied by [`ProviderCredentials::from_env`] when the variable is
    /// unset.
    pub photon_url: Option<String>,
    /// `LOCATIONIQ_API_KEY`.
    pub locationiq_api_key: Option<String>,
    /// `GOOGLE_MAPS_API_KEY`.
    pub google_maps_api_key: Option<String>,
    /// Nominatim needs no key; `OPENSTREETMAP_ENABLED=false` opts out.
    pub openstreetmap_enabled: bool,
    /// `ADDRESS_PROVIDER`: a single provider id, or `None` / `"failover"`
    /// for the full chain.
    pub address_provider: Option<String>,
}

impl ProviderCredentials {
    /// Reads provider credentials from the environment.
    ///
    /// Photon defaults to the public komoot instance when `PHOTON_URL`
    /// is unset; setting it to an empty string disables Photon.
    #[must_use]
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|value| !value.is_empty());

        let photon_url = match std::env::var("PHOTON_URL") {
            Ok(url) if url.is_empty() => None,
            Ok(url) => Some(url),
            Err(_) => Some(photon::DEFAULT_BASE_URL.to_string()),
        };

        Self {
            mapbox_access_token: non_empty("MAPBOX_ACCESS_TOKEN"),
            photon_url,
            locationiq_api_key: non_empty("LOCATIONIQ_API_KEY"),
            google_maps_api_key: non_empty("GOOGLE_MAPS_API_KEY"),
            openstreetmap_enabled: std::env::var("OPENSTREETMAP_ENABLED")
                .map_or(true, |value| !matches!(value.as_str(), "false" | "0")),
            address_provider: non_empty("ADDRESS_PROVIDER").map(|value| value.to_lowercase()),
        }
    }
}

/// Builds the failover chain for the given credentials.
///
/// Services run in priority order; services whose credentials are
/// missing are omitted. When `address_provider` names a single provider,
/// only that provider is considered. The mock provider joins only when
/// the chain would otherwise be empty (or when explicitly selected).
///
/// # Errors
///
/// Returns [`GeocodeError::Http`] if an HTTP client cannot be built.
pub fn build_chain(creds: &ProviderCredentials) -> Result<FailoverChain, GeocodeError> {
    let selected = creds
        .address_provider
        .as_deref()
        .filter(|value| *value != "failover");

    let mut providers: Vec<(String, Box<dyn GeocodingProvider>)> = Vec::new();

    for service in enabled_services() {
        if selected.is_some_and(|want| want != service.id) {
            continue;
        }

        match &service.provider {
            ProviderConfig::Mapbox { base_url } => {
                if let Some(token) = &creds.mapbox_access_token {
                    providers.push((
                        service.id.clone(),
                        Box::new(mapbox::MapboxProvider::new(base_url.clone(), token.clone())?),
                    ));
                }
            }
            ProviderConfig::Photon { base_url } => {
                // Environment URL wins over the embedded default; an
                // explicit single-provider selection falls back to it.
                let url = creds.photon_url.clone().or_else(|| {
                    (selected == Some("photon")).then(|| base_url.clone())
                });
                if let Some(url) = url {
                    providers.push((
                        service.id.clone(),
                        Box::new(photon::PhotonProvider::new(url)?),
                    ));
                }
            }
            ProviderConfig::Locationiq { base_url } => {
                if let Some(key) = &creds.locationiq_api_key {
                    providers.push((
                        service.id.clone(),
                        Box::new(locationiq::LocationIqProvider::new(
                            base_url.clone(),
                            key.clone(),
                        )?),
                    ));
                }
            }
            ProviderConfig::Nominatim { base_url } => {
                if creds.openstreetmap_enabled {
                    providers.push((
                        service.id.clone(),
                        Box::new(nominatim::NominatimProvider::new(Some(base_url.clone()))?),
                    ));
                }
            }
            ProviderConfig::Google { base_url } => {
                if let Some(key) = &creds.google_maps_api_key {
                    providers.push((
                        service.id.clone(),
                        Box::new(google::GoogleProvider::new(base_url.clone(), key.clone())?),
                    ));
                }
            }
            ProviderConfig::Mock => {}
        }
    }

    if providers.is_empty() {
        log::warn!("no real geocoding provider configured; using mock fixtures");
        providers.push(("mock".to_string(), Box::new(mock::MockProvider::new())));
    }

    Ok(FailoverChain::new(providers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn loads_all_services() {
        let services = all_services();
        assert_eq!(services.len(), EXPECTED_SERVICE_COUNT);
    }

    #[test]
    fn service_ids_are_unique() {
        let services = all_services();
        let mut seen = BTreeSet::new();
        for svc in &services {
            assert!(seen.insert(&svc.id), "Duplicate service ID: {}", svc.id);
        }
    }

    #[test]
    fn services_sorted_free_first_paid_last() {
        let ids: Vec<String> = enabled_services().into_iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "mapbox",
                "photon",
                "locationiq",
                "openstreetmap",
                "google",
                "mock"
            ]
        );
    }

    #[test]
    fn chain_omits_providers_without_credentials() {
        let creds = ProviderCredentials {
            mapbox_access_token: Some("pk.test".to_string()),
            photon_url: None,
            locationiq_api_key: None,
            google_maps_api_key: None,
            openstreetmap_enabled: true,
            address_provider: None,
        };

        let chain = build_chain(&creds).unwrap();
        assert_eq!(chain.provider_names(), vec!["mapbox", "openstreetmap"]);
    }

    #[test]
    fn full_credentials_build_full_chain_in_order() {
        let creds = ProviderCredentials {
            mapbox_access_token: Some("pk.test".to_string()),
            photon_url: Some("https://photon.example".to_string()),
            locationiq_api_key: Some("liq.test".to_string()),
            google_maps_api_key: Some("g.test".to_string()),
            openstreetmap_enabled: true,
            address_provider: None,
        };

        let chain = build_chain(&creds).unwrap();
        assert_eq!(
            chain.provider_names(),
            vec!["mapbox", "photon", "locationiq", "openstreetmap", "google"]
        );
    }

    #[test]
    fn empty_credentials_fall_back_to_mock() {
        let creds = ProviderCredentials {
            openstreetmap_enabled: false,
            ..ProviderCredentials::default()
        };

        let chain = build_chain(&creds).unwrap();
        assert_eq!(chain.provider_names(), vec!["mock"]);
    }

    #[test]
    fn single_provider_selection() {
        let creds = ProviderCredentials {
            mapbox_access_token: Some("pk.test".to_string()),
            google_maps_api_key: Some("g.test".to_string()),
            openstreetmap_enabled: true,
            address_provider: Some("google".to_string()),
            ..ProviderCredentials::default()
        };

        let chain = build_chain(&creds).unwrap();
        assert_eq!(chain.provider_names(), vec!["google"]);
    }

    #[test]
    fn selecting_photon_without_url_uses_default() {
        let creds = ProviderCredentials {
            address_provider: Some("photon".to_string()),
            ..ProviderCredentials::default()
        };

        let chain = build_chain(&creds).unwrap();
        assert_eq!(chain.provider_names(), vec!["photon"]);
    }
}
