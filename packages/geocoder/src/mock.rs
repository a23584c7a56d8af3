//! Deterministic mock provider for development and tests.
//!
//! Serves fixture results keyed on substring match of the input, with no
//! network access. Joined to the failover chain only when no real
//! provider is configured.

use async_trait::async_trait;

use crate::{
    AutocompleteOptions, GeocodeError, GeocodingProvider, GeocodingResult, Suggestion,
    ValidationResult, normalize,
};

/// A canned geocoding fixture.
struct Fixture {
    /// Lowercased substring that selects this fixture.
    needle: &'static str,
    place_id: &'static str,
    formatted_address: &'static str,
    latitude: f64,
    longitude: f64,
    street_number: &'static str,
    street_name: &'static str,
    city: &'static str,
    state_code: &'static str,
    state_name: &'static str,
    country_code: &'static str,
    country_name: &'static str,
    postal_code: &'static str,
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        needle: "sydney",
        place_id: "mock:1",
        formatted_address: "123 Main Street, Sydney NSW 2000, Australia",
        latitude: -33.8688,
        longitude: 151.2093,
        street_number: "123",
        street_name: "Main Street",
        city: "Sydney",
        state_code: "NSW",
        state_name: "New South Wales",
        country_code: "AU",
        country_name: "Australia",
        postal_code: "2000",
    },
    Fixture {
        needle: "melbourne",
        place_id: "mock:2",
        formatted_address: "456 Collins Street, Melbourne VIC 3000, Australia",
        latitude: -37.8136,
        longitude: 144.9631,
        street_number: "456",
        street_name: "Collins Street",
        city: "Melbourne",
        state_code: "VIC",
        state_name: "Victoria",
        country_code: "AU",
        country_name: "Australia",
        postal_code: "3000",
    },
    Fixture {
        needle: "san francisco",
        place_id: "mock:3",
        formatted_address: "789 Market Street, San Francisco, CA 94103, USA",
        latitude: 37.7749,
        longitude: -122.4194,
        street_number: "789",
        street_name: "Market Street",
        city: "San Francisco",
        state_code: "CA",
        state_name: "California",
        country_code: "US",
        country_name: "United States",
        postal_code: "94103",
    },
    Fixture {
        needle: "london",
        place_id: "mock:4",
        formatted_address: "10 Downing Street, London SW1A 2AA, United Kingdom",
        latitude: 51.5034,
        longitude: -0.1276,
        street_number: "10",
        street_name: "Downing Street",
        city: "London",
        state_code: "England",
        state_name: "England",
        country_code: "GB",
        country_name: "United Kingdom",
        postal_code: "SW1A 2AA",
    },
];

impl Fixture {
    fn to_result(&self) -> GeocodingResult {
        GeocodingResult {
            formatted_address: self.formatted_address.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            street_number: Some(self.street_number.to_string()),
            street_name: Some(self.street_name.to_string()),
            city: Some(self.city.to_string()),
            district: None,
            state_code: Some(self.state_code.to_string()),
            state_name: Some(self.state_name.to_string()),
            country_code: Some(self.country_code.to_string()),
            country_name: Some(self.country_name.to_string()),
            postal_code: Some(self.postal_code.to_string()),
            place_id: Some(self.place_id.to_string()),
            place_types: vec!["street_address".to_string()],
            confidence: Some(0.95),
            provider: "mock".to_string(),
        }
    }
}

fn find(input: &str) -> Option<&'static Fixture> {
    let lowered = input.to_lowercase();
    FIXTURES.iter().find(|fixture| lowered.contains(fixture.needle))
}

/// Mock provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

impl MockProvider {
    /// Creates the mock provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GeocodingProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeocodingResult>, GeocodeError> {
        Ok(find(address).map(Fixture::to_result))
    }

    async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        // Nearest fixture within a degree in both axes, else nothing.
        Ok(FIXTURES
            .iter()
            .find(|fixture| {
                (fixture.latitude - latitude).abs() < 1.0
                    && (fixture.longitude - longitude).abs() < 1.0
            })
            .map(Fixture::to_result))
    }

    async fn autocomplete(
        &self,
        input: &str,
        options: &AutocompleteOptions,
    ) -> Result<Vec<Suggestion>, GeocodeError> {
        let countries = options.country_codes();
        let lowered = input.to_lowercase();

        Ok(FIXTURES
            .iter()
            .filter(|fixture| fixture.needle.starts_with(&lowered) || lowered.contains(fixture.needle))
            .filter(|fixture| {
                countries.is_empty()
                    || countries
                        .iter()
                        .any(|code| code.eq_ignore_ascii_case(fixture.country_code))
            })
            .map(|fixture| Suggestion {
                description: fixture.formatted_address.to_string(),
                place_id: Some(fixture.place_id.to_string()),
                place_types: vec!["street_address".to_string()],
            })
            .collect())
    }

    async fn place_details(
        &self,
        place_id: &str,
    ) -> Result<Option<GeocodingResult>, GeocodeError> {
        Ok(FIXTURES
            .iter()
            .find(|fixture| fixture.place_id == place_id)
            .map(Fixture::to_result))
    }

    async fn validate_address(&self, address: &str) -> Result<ValidationResult, GeocodeError> {
        let Some(result) = self.geocode(address).await? else {
            return Ok(ValidationResult {
                valid: false,
                normalized: None,
                issues: vec!["Address not found".to_string()],
            });
        };

        let issues = normalize::validation_issues(&result);
        Ok(ValidationResult {
            valid: issues.is_empty(),
            normalized: Some(result),
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn geocode_matches_on_substring() {
        let provider = MockProvider::new();
        let result = provider
            .geocode("123 Main Street, Sydney")
            .await
            .unwrap()
            .unwrap();
        assert!((result.latitude - -33.8688).abs() < 1e-9);
        assert_eq!(result.provider, "mock");
    }

    #[tokio::test]
    async fn geocode_is_deterministic() {
        let provider = MockProvider::new();
        let a = provider.geocode("sydney opera house").await.unwrap();
        let b = provider.geocode("SYDNEY opera house").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn geocode_unknown_returns_none() {
        let provider = MockProvider::new();
        assert!(provider.geocode("nowhere at all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reverse_finds_nearby_fixture() {
        let provider = MockProvider::new();
        let result = provider
            .reverse_geocode(-33.9, 151.2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.city.as_deref(), Some("Sydney"));
    }

    #[tokio::test]
    async fn autocomplete_respects_country_filter() {
        let provider = MockProvider::new();
        let options = AutocompleteOptions {
            components: Some("country:US".to_string()),
            ..AutocompleteOptions::default()
        };
        let suggestions = provider.autocomplete("san francisco", &options).await.unwrap();
        assert_eq!(suggestions.len(), 1);

        let options = AutocompleteOptions {
            components: Some("country:AU".to_string()),
            ..AutocompleteOptions::default()
        };
        let suggestions = provider.autocomplete("san francisco", &options).await.unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn place_details_by_id() {
        let provider = MockProvider::new();
        let result = provider.place_details("mock:3").await.unwrap().unwrap();
        assert_eq!(result.city.as_deref(), Some("San Francisco"));
        assert!(provider.place_details("mock:99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn validate_complete_address_is_valid() {
        let provider = MockProvider::new();
        let validation = provider.validate_address("sydney").await.unwrap();
        assert!(validation.valid);
        assert!(validation.issues.is_empty());
    }
}
